//! Metric recording functions

use std::time::Duration;

use crate::errors::LlmError;
use crate::providers::TokenUsage;
use crate::resilience::BreakerState;

use super::{labels, names};

/// Record a successful provider call
pub fn record_request_success(provider: &str, model: &str, duration: Duration, usage: &TokenUsage, cost: f64) {
    metrics::counter!(
        names::REQUESTS_TOTAL,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .increment(1);

    metrics::histogram!(
        names::REQUEST_DURATION,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .record(duration.as_secs_f64());

    metrics::counter!(
        names::TOKENS_PROMPT,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .increment(usage.prompt_tokens as u64);

    metrics::counter!(
        names::TOKENS_COMPLETION,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .increment(usage.completion_tokens as u64);

    // Counters are integral; spend is tracked in micro-units
    metrics::counter!(
        names::COST_TOTAL,
        labels::keys::PROVIDER => provider.to_string()
    )
    .increment((cost * 1_000_000.0).round().max(0.0) as u64);
}

/// Record a failed provider call
pub fn record_request_failure(provider: &str, model: &str, error: &LlmError, duration: Duration) {
    metrics::counter!(
        names::REQUESTS_TOTAL,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .increment(1);

    metrics::histogram!(
        names::REQUEST_DURATION,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string()
    )
    .record(duration.as_secs_f64());

    metrics::counter!(
        names::ERRORS_TOTAL,
        labels::keys::PROVIDER => provider.to_string(),
        labels::keys::MODEL => model.to_string(),
        labels::keys::ERROR_TYPE => labels::error_type_label(error).to_string()
    )
    .increment(1);

    if matches!(error, LlmError::RateLimit { .. }) {
        record_rate_limit(provider);
    }
}

/// Record retries spent inside one retry loop
pub fn record_retries(provider: &str, retries: u32) {
    if retries == 0 {
        return;
    }
    metrics::counter!(
        names::RETRIES_TOTAL,
        labels::keys::PROVIDER => provider.to_string()
    )
    .increment(retries as u64);
}

pub fn record_rate_limit(provider: &str) {
    metrics::counter!(
        names::RATE_LIMITS_TOTAL,
        labels::keys::PROVIDER => provider.to_string()
    )
    .increment(1);
}

/// Update provider health gauge
pub fn set_provider_health(provider: &str, healthy: bool) {
    metrics::gauge!(
        names::PROVIDER_HEALTHY,
        labels::keys::PROVIDER => provider.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn set_breaker_state(provider: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    metrics::gauge!(
        names::BREAKER_STATE,
        labels::keys::PROVIDER => provider.to_string()
    )
    .set(value);
}

pub fn record_cache_hit() {
    metrics::counter!(names::CACHE_HITS).increment(1);
}

pub fn record_cache_miss() {
    metrics::counter!(names::CACHE_MISSES).increment(1);
}

pub fn record_fallback_exhausted() {
    metrics::counter!(names::FALLBACK_EXHAUSTED).increment(1);
}
