//! Bounded retry with exponential backoff and jitter.
//!
//! [`execute`] is a plain higher-order function: it knows nothing about
//! circuit breakers or providers, only about a [`RetryPolicy`] and an
//! operation producing `LlmResult<T>`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::errors::{LlmError, LlmResult};
use crate::providers::{ProviderSettings, ProviderType};

/// Retry policy for one provider
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 1 disables retries
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra delay, as a fraction of the computed delay
    pub jitter_fraction: f64,
    /// Extra lowercase message fragments that mark an error as retryable
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            base_delay: constants::DEFAULT_RETRY_DELAY,
            max_delay: constants::DEFAULT_MAX_RETRY_DELAY,
            backoff_multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
            jitter_fraction: constants::DEFAULT_JITTER_FRACTION,
            retryable_patterns: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy with retries disabled
    pub fn disabled() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Vendor-tuned defaults.
    ///
    /// Anthropic tends to shed load with `overloaded` errors that clear
    /// slowly, Google recovers quickly from `RESOURCE_EXHAUSTED`.
    pub fn for_provider(provider: ProviderType) -> Self {
        match provider {
            ProviderType::Anthropic => Self::default()
                .base_delay(Duration::from_secs(2))
                .pattern("overloaded_error"),
            ProviderType::OpenAI => Self::default()
                .pattern("server_error"),
            ProviderType::Google => Self::default()
                .max_attempts(4)
                .base_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(10))
                .pattern("resource_exhausted")
                .pattern("unavailable"),
            ProviderType::Mistral => Self::default()
                .max_attempts(2)
                .base_delay(Duration::from_millis(1500)),
        }
    }

    /// Vendor defaults with the attempt budget and base delay from settings applied
    pub fn from_settings(provider: ProviderType, settings: &ProviderSettings) -> Self {
        let mut policy = Self::for_provider(provider);
        if let Some(attempts) = settings.retry_attempts {
            policy.max_attempts = attempts.max(1);
        }
        if let Some(delay) = settings.retry_delay {
            policy.base_delay = delay;
        }
        policy
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.max(0.0);
        self
    }

    /// Treat errors whose message contains `fragment` as retryable
    pub fn pattern(mut self, fragment: impl Into<String>) -> Self {
        self.retryable_patterns.push(fragment.into().to_lowercase());
        self
    }

    /// Whether `error` deserves another attempt under this policy
    pub fn is_retryable(&self, error: &LlmError) -> bool {
        if error.is_permanent() {
            return false;
        }
        if error.is_retryable() {
            return true;
        }
        let message = error.to_string().to_lowercase();
        self.retryable_patterns.iter().any(|p| message.contains(p.as_str()))
    }

    /// `min(max_delay, base_delay * multiplier^(attempt-1) * (1 + jitter))` for a 1-based attempt
    pub fn raw_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let factor = self.backoff_multiplier.powi(exponent) * (1.0 + self.jitter_fraction * jitter.clamp(0.0, 1.0));
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Fresh delay schedule for one retry loop
    pub fn schedule(&self) -> BackoffSchedule<'_> {
        BackoffSchedule { policy: self, attempt: 0, previous: Duration::ZERO }
    }
}

/// Sequence of delays for one retry loop.
///
/// Delays never shrink from one retry to the next and never exceed the
/// policy's `max_delay`, whatever the jitter draws.
pub struct BackoffSchedule<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
    previous: Duration,
}

impl BackoffSchedule<'_> {
    /// Delay before the next retry, honoring a provider reset hint
    pub fn next_delay(&mut self, reset_hint: Option<Duration>) -> Duration {
        let jitter = rand::rng().random::<f64>();
        self.next_delay_with_jitter(reset_hint, jitter)
    }

    pub fn next_delay_with_jitter(&mut self, reset_hint: Option<Duration>, jitter: f64) -> Duration {
        self.attempt += 1;
        let computed = self.policy.raw_delay(self.attempt, jitter);
        let delay = computed
            .max(reset_hint.unwrap_or(Duration::ZERO))
            .max(self.previous)
            .min(self.policy.max_delay);
        self.previous = delay;
        delay
    }
}

/// One failed attempt, kept for observability
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// Sleep before the next attempt; zero for the terminal failure
    pub delay: Duration,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Successful outcome with the failures that preceded it
#[derive(Debug)]
pub struct RetrySuccess<T> {
    pub value: T,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
}

/// Terminal failure with the full attempt history
#[derive(Debug)]
pub struct RetryFailure {
    pub error: LlmError,
    pub history: Vec<AttemptRecord>,
}

impl RetryFailure {
    /// Number of attempts actually made
    pub fn attempts(&self) -> u32 {
        self.history.iter().map(|r| r.attempt).max().unwrap_or(0)
    }
}

/// Run `operation` under `policy`.
///
/// The closure receives the 1-based attempt number. Non-retryable errors
/// end the loop at once; retryable ones are retried after the scheduled
/// delay until the attempt budget is spent. Cancelling `cancel` aborts the
/// running attempt or the backoff sleep with [`LlmError::Cancelled`].
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<RetrySuccess<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = policy.schedule();
    let mut history = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = operation(attempt) => result,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(RetrySuccess { value, attempts: attempt, history });
            }
            Err(error) => error,
        };

        if attempt >= max_attempts || !policy.is_retryable(&error) {
            history.push(AttemptRecord {
                attempt,
                delay: Duration::ZERO,
                error: error.to_string(),
                at: Utc::now(),
            });
            return Err(RetryFailure { error, history });
        }

        let delay = schedule.next_delay(error.reset_after());
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt, max_attempts, error, delay
        );
        history.push(AttemptRecord {
            attempt,
            delay,
            error: error.to_string(),
            at: Utc::now(),
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryFailure { error: LlmError::Cancelled, history });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
