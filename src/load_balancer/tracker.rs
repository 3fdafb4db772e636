use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::constants;
use crate::errors::{LlmError, LlmResult};
use crate::providers::{ProviderType, RateLimit, TokenUsage};

/// Running counters for one provider, updated after every attempt
#[derive(Debug)]
pub struct ProviderTracker {
    pub provider: ProviderType,
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_latency: Duration,
    pub total_cost: f64,
    pub consecutive_errors: u32,
    pub last_request: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub usage: TokenUsage,
    /// Extra attempts spent inside retry loops
    pub retries: u64,
    /// Calls skipped locally because the rate window was full
    pub rate_limited: u64,
    /// Calls admitted during the last minute, with their estimated tokens
    window: VecDeque<(Instant, u32)>,
}

impl ProviderTracker {
    pub fn new(provider: ProviderType) -> Self {
        Self {
            provider,
            requests: 0,
            successes: 0,
            errors: 0,
            total_latency: Duration::ZERO,
            total_cost: 0.0,
            consecutive_errors: 0,
            last_request: None,
            last_error: None,
            last_error_message: None,
            usage: TokenUsage::default(),
            retries: 0,
            rate_limited: 0,
            window: VecDeque::new(),
        }
    }

    /// Record a successful call
    ///
    /// # Parameters
    /// * `latency` - Wall time of the call including retries
    /// * `cost` - Billed cost of the response
    /// * `usage` - Tokens reported by the provider
    pub fn record_success(&mut self, latency: Duration, cost: f64, usage: &TokenUsage) {
        self.record_request(latency);
        self.successes += 1;
        self.consecutive_errors = 0;
        self.total_cost += cost;
        self.usage.add(usage);
    }

    /// Record a failed call
    pub fn record_failure(&mut self, latency: Duration, error: &LlmError) {
        self.record_request(latency);
        self.errors += 1;
        self.consecutive_errors += 1;
        self.last_error = Some(Utc::now());
        self.last_error_message = Some(error.to_string());
    }

    fn record_request(&mut self, latency: Duration) {
        self.requests += 1;
        self.total_latency += latency;
        self.last_request = Some(Utc::now());
    }

    pub fn record_retries(&mut self, retries: u32) {
        self.retries += retries as u64;
    }

    /// Average latency over every recorded call, zero before the first one
    pub fn avg_latency(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        self.total_latency / self.requests.min(u32::MAX as u64) as u32
    }

    /// Error rate as a percentage
    ///
    /// # Returns
    /// * Error rate from 0.0 to 100.0, or 0.0 if no requests
    pub fn error_rate(&self) -> f64 {
        if self.requests > 0 {
            (self.errors as f64 / self.requests as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Admit a call into the rate window, or reject it when a per-minute ceiling is reached
    ///
    /// # Parameters
    /// * `limit` - Configured ceilings; unset ceilings never reject
    /// * `tokens` - Estimated tokens the call will consume
    pub fn try_admit(&mut self, limit: &RateLimit, tokens: u32) -> LlmResult<()> {
        let now = Instant::now();
        while let Some((at, _)) = self.window.front() {
            if now.duration_since(*at) >= constants::RATE_WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let reset_after = self
            .window
            .front()
            .map(|(at, _)| constants::RATE_WINDOW.saturating_sub(now.duration_since(*at)));

        if let Some(rpm) = limit.requests_per_minute {
            if self.window.len() as u64 >= rpm as u64 {
                self.rate_limited += 1;
                return Err(LlmError::RateLimit {
                    message: format!("{} local limit of {} requests per minute reached", self.provider, rpm),
                    reset_after,
                });
            }
        }

        if let Some(tpm) = limit.tokens_per_minute {
            let used: u64 = self.window.iter().map(|(_, t)| *t as u64).sum();
            if used + tokens as u64 > tpm as u64 && !self.window.is_empty() {
                self.rate_limited += 1;
                return Err(LlmError::RateLimit {
                    message: format!("{} local limit of {} tokens per minute reached", self.provider, tpm),
                    reset_after,
                });
            }
        }

        self.window.push_back((now, tokens));
        Ok(())
    }

    /// Calls admitted in the current window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_and_latency() {
        let mut tracker = ProviderTracker::new(ProviderType::OpenAI);
        assert_eq!(tracker.error_rate(), 0.0);
        assert_eq!(tracker.avg_latency(), Duration::ZERO);

        tracker.record_success(Duration::from_millis(100), 0.5, &TokenUsage::new(10, 20));
        tracker.record_failure(Duration::from_millis(300), &LlmError::Timeout(Duration::from_secs(1)));

        assert_eq!(tracker.error_rate(), 50.0);
        assert_eq!(tracker.avg_latency(), Duration::from_millis(200));
        assert_eq!(tracker.consecutive_errors, 1);
        assert_eq!(tracker.usage.total_tokens, 30);
        assert!(tracker.last_error_message.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_success_resets_consecutive_errors() {
        let mut tracker = ProviderTracker::new(ProviderType::OpenAI);
        let err = LlmError::Timeout(Duration::from_secs(1));
        tracker.record_failure(Duration::ZERO, &err);
        tracker.record_failure(Duration::ZERO, &err);
        tracker.record_success(Duration::ZERO, 0.0, &TokenUsage::default());
        assert_eq!(tracker.consecutive_errors, 0);
        assert_eq!(tracker.errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_window_slides() {
        let mut tracker = ProviderTracker::new(ProviderType::Mistral);
        let limit = RateLimit { requests_per_minute: Some(2), tokens_per_minute: None };

        assert!(tracker.try_admit(&limit, 10).is_ok());
        assert!(tracker.try_admit(&limit, 10).is_ok());
        let err = tracker.try_admit(&limit, 10).unwrap_err();
        assert!(matches!(err, LlmError::RateLimit { reset_after: Some(_), .. }));
        assert_eq!(tracker.rate_limited, 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(tracker.try_admit(&limit, 10).is_ok());
        assert_eq!(tracker.window_len(), 1);
    }

    #[tokio::test]
    async fn test_token_window() {
        let mut tracker = ProviderTracker::new(ProviderType::Google);
        let limit = RateLimit { requests_per_minute: None, tokens_per_minute: Some(100) };

        // A single oversized call is admitted into an empty window
        assert!(tracker.try_admit(&limit, 150).is_ok());
        assert!(tracker.try_admit(&limit, 1).is_err());
    }
}
