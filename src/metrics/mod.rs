//! Optional metrics emission for the router.
//!
//! Enable with the `metrics` feature flag. The crate only talks to the
//! `metrics` facade; installing an exporter is up to the application.
//!
//! # Example
//!
//! ```ignore
//! use relayllm::metrics::describe_metrics;
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([127, 0, 0, 1], 9090))
//!     .install()
//!     .expect("prometheus setup");
//!
//! describe_metrics();
//! ```

pub mod labels;
mod recorder;

pub use recorder::*;

/// Metric name constants
pub mod names {
    /// Provider calls, successful or not
    pub const REQUESTS_TOTAL: &str = "relayllm_requests_total";
    /// Provider call duration in seconds, retries included
    pub const REQUEST_DURATION: &str = "relayllm_request_duration_seconds";
    pub const TOKENS_PROMPT: &str = "relayllm_tokens_prompt_total";
    pub const TOKENS_COMPLETION: &str = "relayllm_tokens_completion_total";
    /// Failed provider calls by error type
    pub const ERRORS_TOTAL: &str = "relayllm_errors_total";
    /// Provider health (1=healthy, 0=unhealthy)
    pub const PROVIDER_HEALTHY: &str = "relayllm_provider_healthy";
    pub const RETRIES_TOTAL: &str = "relayllm_retries_total";
    /// Rate limit responses, from the vendor or the local window
    pub const RATE_LIMITS_TOTAL: &str = "relayllm_rate_limits_total";
    pub const CACHE_HITS: &str = "relayllm_cache_hits_total";
    pub const CACHE_MISSES: &str = "relayllm_cache_misses_total";
    /// Breaker state (0=closed, 1=half-open, 2=open)
    pub const BREAKER_STATE: &str = "relayllm_breaker_state";
    /// Accumulated spend in the configured currency
    pub const COST_TOTAL: &str = "relayllm_cost_total";
    /// Requests that failed on every provider
    pub const FALLBACK_EXHAUSTED: &str = "relayllm_fallback_exhausted_total";
}

/// Describe all metrics with their units and descriptions.
/// Call this after setting up your metrics exporter for better discovery.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    describe_counter!(names::REQUESTS_TOTAL, Unit::Count, "Total number of provider calls");
    describe_histogram!(names::REQUEST_DURATION, Unit::Seconds, "Provider call duration in seconds");
    describe_counter!(names::TOKENS_PROMPT, Unit::Count, "Total prompt tokens consumed");
    describe_counter!(names::TOKENS_COMPLETION, Unit::Count, "Total completion tokens generated");
    describe_counter!(names::ERRORS_TOTAL, Unit::Count, "Total number of provider errors by type");
    describe_gauge!(names::PROVIDER_HEALTHY, Unit::Count, "Provider health status (1=healthy, 0=unhealthy)");
    describe_counter!(names::RETRIES_TOTAL, Unit::Count, "Total number of retry attempts");
    describe_counter!(names::RATE_LIMITS_TOTAL, Unit::Count, "Total number of rate limit rejections");
    describe_counter!(names::CACHE_HITS, Unit::Count, "Responses served from the cache");
    describe_counter!(names::CACHE_MISSES, Unit::Count, "Cache lookups that fell through to a provider");
    describe_gauge!(names::BREAKER_STATE, Unit::Count, "Circuit breaker state (0=closed, 1=half-open, 2=open)");
    describe_counter!(names::COST_TOTAL, Unit::Count, "Accumulated provider spend");
    describe_counter!(names::FALLBACK_EXHAUSTED, Unit::Count, "Requests that failed on every provider");
}
