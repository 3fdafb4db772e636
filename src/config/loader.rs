//! Configuration file loading and environment variable resolution.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants;
use crate::errors::{LlmError, LlmResult};
use crate::load_balancer::StrategyKind;
use crate::providers::ProviderType;
use super::types::Config;

/// Load and parse a TOML configuration file.
///
/// # Arguments
/// * `path` - Path to the TOML configuration file
///
/// # Returns
/// * `LlmResult<Config>` - Parsed configuration with environment variables resolved
///
/// # Example
/// ```no_run
/// use relayllm::config::load_config;
///
/// let config = load_config("relayllm.toml").unwrap();
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> LlmResult<Config> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| {
        LlmError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content)
}

/// Parse a TOML configuration string.
///
/// # Arguments
/// * `content` - TOML configuration string
///
/// # Returns
/// * `LlmResult<Config>` - Parsed configuration with environment variables resolved
pub fn parse_config(content: &str) -> LlmResult<Config> {
    let mut config: Config = toml::from_str(content).map_err(|e| {
        LlmError::ConfigError(format!("Failed to parse TOML: {}", e))
    })?;

    resolve_env_vars(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"))
}

/// Resolve `${VAR_NAME}` references in API keys and endpoints.
fn resolve_env_vars(config: &mut Config) -> LlmResult<()> {
    for (idx, provider) in config.providers.iter_mut().enumerate() {
        provider.api_key = resolve_env_var_string(&provider.api_key).map_err(|var_name| {
            LlmError::ConfigError(format!(
                "Environment variable '{}' not found\n  \
                 → Referenced in providers[{}].api_key\n  \
                 → Set it with: export {}=\"your-key\"",
                var_name, idx, var_name
            ))
        })?;

        if let Some(endpoint) = provider.endpoint.take() {
            let resolved = resolve_env_var_string(&endpoint).map_err(|var_name| {
                LlmError::ConfigError(format!(
                    "Environment variable '{}' not found\n  \
                     → Referenced in providers[{}].endpoint",
                    var_name, idx
                ))
            })?;
            provider.endpoint = Some(resolved);
        }
    }

    Ok(())
}

/// Substitute every variable reference in `s`, or return the first missing variable name.
fn resolve_env_var_string(s: &str) -> Result<String, String> {
    let pattern = env_var_pattern();
    let mut result = s.to_string();

    for caps in pattern.captures_iter(s) {
        let (full_match, [var_name]) = caps.extract();
        match env::var(var_name) {
            Ok(value) => result = result.replace(full_match, &value),
            Err(_) => return Err(var_name.to_string()),
        }
    }

    Ok(result)
}

/// Validate the configuration for consistency.
pub(crate) fn validate_config(config: &Config) -> LlmResult<()> {
    config.settings.strategy.parse::<StrategyKind>()?;

    let mut seen = HashSet::new();
    for (idx, provider) in config.providers.iter().enumerate() {
        let provider_type = provider.provider_type.parse::<ProviderType>().map_err(|_| {
            LlmError::ConfigError(format!(
                "Unknown provider type '{}' in providers[{}]\n  \
                 → Valid types: {}",
                provider.provider_type,
                idx,
                ProviderType::ALL.map(ProviderType::as_str).join(", ")
            ))
        })?;

        if !seen.insert(provider_type) {
            return Err(LlmError::ConfigError(format!(
                "Provider '{}' is configured more than once (providers[{}])\n  \
                 → Keep a single [[providers]] entry per provider type",
                provider_type.as_str(),
                idx
            )));
        }

        if provider.max_tokens_per_request <= 0 {
            return Err(LlmError::ConfigError(format!(
                "providers[{}].max_tokens_per_request must be positive, got {}",
                idx, provider.max_tokens_per_request
            )));
        }

        if provider.timeout_secs == 0 {
            return Err(LlmError::ConfigError(format!(
                "providers[{}].timeout_secs must be at least 1",
                idx
            )));
        }

        if provider.cost_per_token < 0.0 {
            return Err(LlmError::ConfigError(format!(
                "providers[{}].cost_per_token must not be negative, got {}",
                idx, provider.cost_per_token
            )));
        }

        if provider.weight < 0.0 {
            return Err(LlmError::ConfigError(format!(
                "providers[{}].weight must not be negative, got {}",
                idx, provider.weight
            )));
        }
    }

    let mut budgeted = HashSet::new();
    for (idx, budget) in config.budgets.iter().enumerate() {
        let provider_type = budget.provider.parse::<ProviderType>().map_err(|_| {
            LlmError::ConfigError(format!(
                "Unknown provider '{}' in budgets[{}]",
                budget.provider, idx
            ))
        })?;

        if !budgeted.insert(provider_type) {
            return Err(LlmError::ConfigError(format!(
                "Budget for '{}' is defined more than once (budgets[{}])",
                provider_type.as_str(),
                idx
            )));
        }

        for (window, value) in [("daily", budget.daily), ("weekly", budget.weekly), ("monthly", budget.monthly)] {
            if value.is_some_and(|v| v < 0.0) {
                return Err(LlmError::ConfigError(format!(
                    "budgets[{}].{} must not be negative",
                    idx, window
                )));
            }
        }
    }

    if config.cache.max_size == 0 {
        return Err(LlmError::ConfigError(
            "cache.max_size must be at least 1".to_string(),
        ));
    }

    if !(1..=constants::COST_MAX_RETENTION_DAYS).contains(&config.cost.retention_days) {
        return Err(LlmError::ConfigError(format!(
            "cost.retention_days must be between 1 and {}, got {}",
            constants::COST_MAX_RETENTION_DAYS,
            config.cost.retention_days
        )));
    }

    if config.circuit_breaker.failure_threshold == 0 || config.circuit_breaker.success_threshold == 0 {
        return Err(LlmError::ConfigError(
            "circuit_breaker thresholds must be at least 1".to_string(),
        ));
    }

    Ok(())
}
