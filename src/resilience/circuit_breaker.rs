//! Per-provider circuit breaker.
//!
//! The breaker is a small state machine guarded by an async mutex:
//!
//! - `Closed`: calls flow; consecutive failures are counted and the breaker
//!   opens once they reach `failure_threshold`.
//! - `Open`: every call is rejected without touching the wrapped operation
//!   until `recovery_timeout` has elapsed since it opened.
//! - `HalfOpen`: entered lazily by the first call after the recovery time.
//!   Calls flow; one failure reopens the breaker with a fresh timer, and
//!   `success_threshold` consecutive successes close it again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Serialize, Deserialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::errors::{LlmError, LlmResult};
use crate::providers::ProviderType;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected
    Open,
    /// Trial requests are let through to probe recovery
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time an open breaker waits before allowing a trial call
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes that close the breaker
    pub success_threshold: u32,
    /// How often the monitor task checks open breakers
    pub monitor_interval: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::BREAKER_FAILURE_THRESHOLD,
            recovery_timeout: constants::BREAKER_RECOVERY_TIMEOUT,
            success_threshold: constants::BREAKER_SUCCESS_THRESHOLD,
            monitor_interval: constants::BREAKER_MONITOR_INTERVAL,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub last_failure: Option<Instant>,
    /// When an open breaker becomes eligible for a trial call
    pub next_attempt: Option<Instant>,
    pub times_opened: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
    times_opened: u64,
    rejected_calls: u64,
}

impl BreakerInner {
    fn closed() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
            next_attempt: None,
            times_opened: 0,
            rejected_calls: 0,
        }
    }

    fn open(&mut self, now: Instant, recovery_timeout: Duration) {
        self.state = BreakerState::Open;
        self.half_open_successes = 0;
        self.next_attempt = Some(now + recovery_timeout);
        self.times_opened += 1;
    }
}

/// Failure-isolation state machine for one provider
pub struct CircuitBreaker {
    provider: ProviderType,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderType, config: BreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(BreakerInner::closed()),
        }
    }

    pub fn provider(&self) -> ProviderType {
        self.provider
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejected calls return [`LlmError::CircuitOpen`] without polling the
    /// operation. Failures that say nothing about provider health (see
    /// [`LlmError::counts_against_provider`]) leave the state untouched.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> LlmResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        self.try_acquire().await?;

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success().await,
            Err(e) if e.counts_against_provider() => self.record_failure().await,
            Err(e) => debug!("{} breaker ignoring client-side failure: {}", self.provider, e),
        }
        result
    }

    /// Admit or reject one call, moving an expired `Open` breaker to `HalfOpen`.
    pub async fn try_acquire(&self) -> LlmResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != BreakerState::Open {
            return Ok(());
        }

        let now = Instant::now();
        match inner.next_attempt {
            Some(at) if now >= at => {
                inner.state = BreakerState::HalfOpen;
                inner.half_open_successes = 0;
                info!("{} circuit breaker half-open, allowing trial calls", self.provider);
                Ok(())
            }
            _ => {
                inner.rejected_calls += 1;
                Err(LlmError::CircuitOpen(self.provider.to_string()))
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.next_attempt = None;
                    info!("{} circuit breaker closed after successful trials", self.provider);
                }
            }
            // A call admitted before the breaker opened finished late
            BreakerState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.last_failure = Some(now);
        inner.consecutive_failures += 1;

        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.open(now, self.config.recovery_timeout);
                    warn!(
                        "{} circuit breaker opened after {} consecutive failures, retry in {:?}",
                        self.provider, inner.consecutive_failures, self.config.recovery_timeout
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.open(now, self.config.recovery_timeout);
                warn!("{} circuit breaker reopened after failed trial call", self.provider);
            }
            BreakerState::Open => {}
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    /// Whether the next call would be admitted, without changing state
    pub async fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Open => inner.next_attempt.is_some_and(|at| Instant::now() >= at),
            _ => true,
        }
    }

    /// Open and past its recovery time, but not yet probed
    pub async fn is_recovery_eligible(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == BreakerState::Open && inner.next_attempt.is_some_and(|at| Instant::now() >= at)
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            last_failure: inner.last_failure,
            next_attempt: inner.next_attempt,
            times_opened: inner.times_opened,
            rejected_calls: inner.rejected_calls,
        }
    }

    /// Force the breaker back to `Closed`
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let times_opened = inner.times_opened;
        *inner = BreakerInner::closed();
        inner.times_opened = times_opened;
        info!("{} circuit breaker manually reset", self.provider);
    }
}

/// Periodically report open breakers that became eligible for recovery.
///
/// Observability only: the `Open` → `HalfOpen` transition still happens on
/// the next call through [`CircuitBreaker::try_acquire`].
pub fn spawn_breaker_monitor(
    breakers: Vec<Arc<CircuitBreaker>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Circuit breaker monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    for breaker in &breakers {
                        let state = breaker.state().await;
                        #[cfg(feature = "metrics")]
                        crate::metrics::set_breaker_state(breaker.provider().as_str(), state);
                        if state == BreakerState::Open && breaker.is_recovery_eligible().await {
                            info!("{} circuit breaker eligible for a half-open trial", breaker.provider());
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            ProviderType::OpenAI,
            BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
                success_threshold: successes,
                ..BreakerConfig::default()
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> LlmResult<()> {
        b.execute(|| async {
            Err::<(), _>(LlmError::Provider { message: "down".into(), status: Some(503), retryable: true })
        })
        .await
    }

    async fn succeed(b: &CircuitBreaker) -> LlmResult<()> {
        b.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let b = breaker(3, Duration::from_secs(60), 1);
        for _ in 0..2 {
            assert!(fail(&b).await.is_err());
            assert_eq!(b.state().await, BreakerState::Closed);
        }
        assert!(fail(&b).await.is_err());
        assert_eq!(b.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let b = breaker(3, Duration::from_secs(60), 1);
        fail(&b).await.ok();
        fail(&b).await.ok();
        succeed(&b).await.unwrap();
        fail(&b).await.ok();
        fail(&b).await.ok();
        assert_eq!(b.state().await, BreakerState::Closed);
        assert_eq!(b.snapshot().await.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_client_side_errors_do_not_trip() {
        let b = breaker(1, Duration::from_secs(60), 1);
        let result = b
            .execute(|| async { Err::<(), _>(LlmError::TokenLimit("too long".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(b.state().await, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_running_operation() {
        let b = breaker(1, Duration::from_secs(30), 1);
        fail(&b).await.ok();

        let mut ran = false;
        let result = b.execute(|| { ran = true; async { Ok(()) } }).await;
        assert!(matches!(result, Err(LlmError::CircuitOpen(_))));
        assert!(!ran);
        assert_eq!(b.snapshot().await.rejected_calls, 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!b.is_call_permitted().await);
        assert!(matches!(succeed(&b).await, Err(LlmError::CircuitOpen(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_timer() {
        let b = breaker(1, Duration::from_secs(30), 3);
        fail(&b).await.ok();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.is_recovery_eligible().await);

        assert!(fail(&b).await.is_err());
        let snapshot = b.snapshot().await;
        assert_eq!(snapshot.state, BreakerState::Open);
        assert_eq!(snapshot.times_opened, 2);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(matches!(succeed(&b).await, Err(LlmError::CircuitOpen(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_success_threshold() {
        let b = breaker(1, Duration::from_secs(30), 3);
        fail(&b).await.ok();
        tokio::time::advance(Duration::from_secs(30)).await;

        succeed(&b).await.unwrap();
        assert_eq!(b.state().await, BreakerState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state().await, BreakerState::HalfOpen);
        succeed(&b).await.unwrap();

        let snapshot = b.snapshot().await;
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.next_attempt.is_none());
    }

    #[tokio::test]
    async fn test_reset_closes_breaker() {
        let b = breaker(1, Duration::from_secs(60), 1);
        fail(&b).await.ok();
        b.reset().await;
        assert_eq!(b.state().await, BreakerState::Closed);
        assert!(succeed(&b).await.is_ok());
    }
}
