//! Configuration types for TOML-based configuration.
//!
//! These types map directly to the TOML configuration file structure.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::constants;
use crate::cost::{BudgetLimits, CostConfig};
use crate::providers::{ProviderSettings, RateLimit};
use crate::resilience::BreakerConfig;

/// Root configuration structure.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub circuit_breaker: BreakerSection,

    #[serde(default)]
    pub cost: CostSection,

    /// Provider configurations, one per provider type.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Spend ceilings, one entry per provider.
    #[serde(default)]
    pub budgets: Vec<BudgetConfig>,
}

/// Global settings for the LlmManager.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Load balancing strategy: "round_robin", "weighted", "least_latency" or "cost_optimized".
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Coalesce concurrent identical requests.
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            single_flight: true,
        }
    }
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_size: usize,
    pub default_ttl_secs: u64,
    pub time_sensitive_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_size: constants::CACHE_MAX_SIZE,
            default_ttl_secs: constants::CACHE_DEFAULT_TTL.as_secs(),
            time_sensitive_ttl_secs: constants::CACHE_TIME_SENSITIVE_TTL.as_secs(),
            sweep_interval_secs: constants::CACHE_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.max_size,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            time_sensitive_ttl: Duration::from_secs(self.time_sensitive_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
    pub monitor_interval_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: constants::BREAKER_FAILURE_THRESHOLD,
            recovery_timeout_secs: constants::BREAKER_RECOVERY_TIMEOUT.as_secs(),
            success_threshold: constants::BREAKER_SUCCESS_THRESHOLD,
            monitor_interval_secs: constants::BREAKER_MONITOR_INTERVAL.as_secs(),
        }
    }
}

impl BreakerSection {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            success_threshold: self.success_threshold,
            monitor_interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CostSection {
    pub retention_days: i64,
    pub sweep_interval_secs: u64,
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            retention_days: constants::COST_RETENTION_DAYS,
            sweep_interval_secs: constants::COST_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl CostSection {
    /// Ledger settings for this section. Call after validation.
    pub fn to_cost_config(&self) -> CostConfig {
        CostConfig {
            retention: chrono::Duration::days(self.retention_days.clamp(1, constants::COST_MAX_RETENTION_DAYS)),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai", "anthropic", "google" or "mistral".
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Default model identifier, used for the `default` alias and empty requests.
    pub model: String,

    /// API key (supports environment variable syntax: "${VAR_NAME}").
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower values are tried first.
    #[serde(default)]
    pub priority: u32,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: i64,

    #[serde(default)]
    pub cost_per_token: f64,

    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,

    /// Accepted vendor models; empty accepts anything.
    #[serde(default)]
    pub models: Vec<String>,

    /// Custom endpoint URL (proxies or self-hosted gateways).
    pub endpoint: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_tokens() -> i64 {
    constants::DEFAULT_MAX_TOKENS_PER_REQUEST as i64
}

fn default_timeout_secs() -> u64 {
    constants::DEFAULT_TIMEOUT.as_secs()
}

impl ProviderConfig {
    /// Runtime settings for this provider. Call after validation.
    pub fn to_settings(&self) -> ProviderSettings {
        ProviderSettings {
            enabled: self.enabled,
            priority: self.priority,
            weight: self.weight,
            max_tokens_per_request: self.max_tokens_per_request.clamp(1, u32::MAX as i64) as u32,
            cost_per_token: self.cost_per_token,
            rate_limit: RateLimit {
                requests_per_minute: self.requests_per_minute,
                tokens_per_minute: self.tokens_per_minute,
            },
            timeout: Duration::from_secs(self.timeout_secs),
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay_ms.map(Duration::from_millis),
            models: self.models.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Budget entry for one provider.
#[derive(Debug, Deserialize)]
pub struct BudgetConfig {
    pub provider: String,
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
}

impl BudgetConfig {
    pub fn to_limits(&self) -> BudgetLimits {
        BudgetLimits {
            daily: self.daily,
            weekly: self.weekly,
            monthly: self.monthly,
        }
    }
}
