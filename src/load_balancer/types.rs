use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::providers::{ProviderType, TokenUsage};
use crate::resilience::BreakerState;

/// Health of one provider as reported by [`LlmManager::get_health_status`](super::LlmManager::get_health_status)
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub provider: ProviderType,
    /// Error rate under 10% and breaker not open
    pub healthy: bool,
    pub enabled: bool,
    pub breaker_state: BreakerState,
    pub avg_latency: Duration,
    /// Percentage, 0.0 to 100.0
    pub error_rate: f64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

/// Snapshot of the running counters for one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMetrics {
    pub provider: ProviderType,
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_latency: Duration,
    pub avg_latency: Duration,
    pub total_cost: f64,
    pub consecutive_errors: u32,
    pub error_rate: f64,
    pub last_request: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub usage: TokenUsage,
    pub retries: u64,
    pub rate_limited: u64,
    pub breaker_state: BreakerState,
    pub breaker_rejections: u64,
    pub breaker_times_opened: u64,
}
