use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheConfig, ResponseCache};
use crate::config::Config;
use crate::cost::{self, BudgetLimits, CostConfig, CostLedger};
use crate::errors::{LlmError, LlmResult};
use crate::providers::{create_adapter, ProviderAdapter, ProviderMap, ProviderSettings, ProviderType};
use crate::resilience::{spawn_breaker_monitor, BreakerConfig, CircuitBreaker, RetryPolicy};

use super::inflight::SingleFlight;
use super::manager::{LlmManager, ProviderSlot};
use super::strategies::{LoadBalancingStrategy, StrategyKind};
use super::tracker::ProviderTracker;

/// Where a provider's adapter comes from
enum AdapterSource {
    Remote { provider_type: ProviderType, model: String, api_key: String },
    /// Caller-supplied adapter; it carries its own settings
    Custom(Arc<dyn ProviderAdapter + Send + Sync>),
}

/// Internal helper struct for Builder
struct ProviderEntry {
    source: AdapterSource,
    settings: ProviderSettings,
    retry_policy: Option<RetryPolicy>,
}

impl ProviderEntry {
    fn provider_type(&self) -> ProviderType {
        match &self.source {
            AdapterSource::Remote { provider_type, .. } => *provider_type,
            AdapterSource::Custom(adapter) => adapter.provider_type(),
        }
    }
}

/// LlmManager Builder
pub struct LlmManagerBuilder {
    providers: Vec<ProviderEntry>,
    strategy: Box<dyn LoadBalancingStrategy>,
    cache_config: CacheConfig,
    breaker_config: BreakerConfig,
    cost_config: CostConfig,
    budgets: Vec<(ProviderType, BudgetLimits)>,
    single_flight: bool,
}

impl Default for LlmManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        LlmManagerBuilder {
            providers: Vec::new(),
            strategy: StrategyKind::default().build(),
            cache_config: CacheConfig::default(),
            breaker_config: BreakerConfig::default(),
            cost_config: CostConfig::default(),
            budgets: Vec::new(),
            single_flight: true,
        }
    }

    /// Prepare a builder from a configuration, validating it first
    pub fn from_config(config: Config) -> LlmResult<Self> {
        crate::config::validate_config(&config)?;

        let mut builder = Self::new()
            .strategy(config.settings.strategy.parse()?)
            .single_flight(config.settings.single_flight)
            .cache_config(config.cache.to_cache_config())
            .breaker_config(config.circuit_breaker.to_breaker_config())
            .cost_config(config.cost.to_cost_config());

        for provider in &config.providers {
            let provider_type: ProviderType = provider.provider_type.parse()?;
            builder.providers.push(ProviderEntry {
                source: AdapterSource::Remote {
                    provider_type,
                    model: provider.model.clone(),
                    api_key: provider.api_key.clone(),
                },
                settings: provider.to_settings(),
                retry_policy: None,
            });
        }

        for budget in &config.budgets {
            builder = builder.budget(budget.provider.parse()?, budget.to_limits());
        }

        Ok(builder)
    }

    /// Sets the load balancing strategy for the manager.
    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy = kind.build();
        self
    }

    /// Use a strategy that is not one of the built-in kinds.
    pub fn custom_strategy(mut self, strategy: Box<dyn LoadBalancingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn cost_config(mut self, config: CostConfig) -> Self {
        self.cost_config = config;
        self
    }

    /// Coalesce concurrent identical requests (on by default).
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Set spend ceilings for a provider.
    pub fn budget(mut self, provider: ProviderType, limits: BudgetLimits) -> Self {
        self.budgets.retain(|(p, _)| *p != provider);
        self.budgets.push((provider, limits));
        self
    }

    /// Begins configuring a new provider.
    /// Subsequent calls like `.enabled()`, `.priority()`, `.cost_per_token()` will apply to this provider.
    pub fn add_provider(
        mut self,
        provider_type: ProviderType,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.providers.push(ProviderEntry {
            source: AdapterSource::Remote {
                provider_type,
                model: model.into(),
                api_key: api_key.into(),
            },
            settings: ProviderSettings::default(),
            retry_policy: None,
        });
        self
    }

    /// Adds a ready-made adapter, e.g. a test double or an in-house gateway.
    /// Its settings come from [`ProviderAdapter::settings`]; only `.retry_policy()` applies to it.
    pub fn add_adapter(mut self, adapter: Arc<dyn ProviderAdapter + Send + Sync>) -> Self {
        let settings = adapter.settings().clone();
        self.providers.push(ProviderEntry {
            source: AdapterSource::Custom(adapter),
            settings,
            retry_policy: None,
        });
        self
    }

    /// Mutable access to the *last added* provider.
    /// Panics if no provider was added yet.
    fn last(&mut self, setter: &str) -> &mut ProviderEntry {
        match self.providers.last_mut() {
            Some(entry) => {
                if matches!(entry.source, AdapterSource::Custom(_)) && setter != "retry_policy" {
                    warn!("'.{}()' has no effect on a custom adapter; it supplies its own settings", setter);
                }
                entry
            }
            None => panic!("'.{}()' called before '.add_provider()'", setter),
        }
    }

    /// Sets the enabled status for the *last added* provider.
    /// Panics if `add_provider` was not called before this.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.last("enabled").settings.enabled = enabled;
        self
    }

    /// Sets the priority of the *last added* provider; lower is tried first.
    pub fn priority(mut self, priority: u32) -> Self {
        self.last("priority").settings.priority = priority;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.last("weight").settings.weight = weight;
        self
    }

    pub fn max_tokens_per_request(mut self, max_tokens: u32) -> Self {
        self.last("max_tokens_per_request").settings.max_tokens_per_request = max_tokens;
        self
    }

    pub fn cost_per_token(mut self, cost: f64) -> Self {
        self.last("cost_per_token").settings.cost_per_token = cost;
        self
    }

    pub fn requests_per_minute(mut self, limit: u32) -> Self {
        self.last("requests_per_minute").settings.rate_limit.requests_per_minute = Some(limit);
        self
    }

    pub fn tokens_per_minute(mut self, limit: u32) -> Self {
        self.last("tokens_per_minute").settings.rate_limit.tokens_per_minute = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.last("timeout").settings.timeout = timeout;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.last("retry_attempts").settings.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.last("retry_delay").settings.retry_delay = Some(delay);
        self
    }

    /// Restricts the *last added* provider to the given vendor models.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.last("models").settings.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a custom endpoint for the *last added* provider.
    /// Panics if `add_provider` was not called before this.
    pub fn custom_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.last("custom_endpoint").settings.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the derived retry policy of the *last added* provider.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.last("retry_policy").retry_policy = Some(policy);
        self
    }

    /// Consumes the builder and constructs the `LlmManager`.
    /// Returns an error if a provider is added twice or its adapter cannot be created.
    pub async fn build(self) -> LlmResult<LlmManager> {
        let mut slots = ProviderMap::new();

        for entry in self.providers {
            let provider_type = entry.provider_type();
            if slots.contains(provider_type) {
                return Err(LlmError::ConfigError(format!(
                    "Build failed: provider '{}' was added more than once",
                    provider_type
                )));
            }

            let adapter = match entry.source {
                AdapterSource::Remote { provider_type, model, api_key } => {
                    create_adapter(provider_type, api_key, model, entry.settings)?
                }
                AdapterSource::Custom(adapter) => adapter,
            };

            let policy = entry
                .retry_policy
                .unwrap_or_else(|| RetryPolicy::from_settings(provider_type, adapter.settings()));
            debug!(
                "Built provider {} (enabled: {}, priority: {}, {} attempts)",
                provider_type,
                adapter.settings().enabled,
                adapter.settings().priority,
                policy.max_attempts
            );

            slots.insert(
                provider_type,
                ProviderSlot {
                    adapter,
                    breaker: Arc::new(CircuitBreaker::new(provider_type, self.breaker_config.clone())),
                    tracker: Mutex::new(ProviderTracker::new(provider_type)),
                    policy,
                },
            );
        }

        if slots.is_empty() {
            warn!("LlmManager built with no providers.");
        }

        let ledger = Arc::new(CostLedger::new(self.cost_config));
        for (provider, limits) in self.budgets {
            ledger.set_budget(provider, limits).await;
        }
        let cache = Arc::new(ResponseCache::new(self.cache_config));

        #[cfg(feature = "metrics")]
        crate::metrics::describe_metrics();

        let shutdown = CancellationToken::new();
        let breakers = slots.iter().map(|(_, slot)| slot.breaker.clone()).collect();
        spawn_breaker_monitor(breakers, self.breaker_config.monitor_interval, shutdown.child_token());
        cache::spawn_cache_sweeper(cache.clone(), shutdown.child_token());
        cost::spawn_cost_sweeper(ledger.clone(), shutdown.child_token());

        info!(
            "LlmManager ready with {} provider(s), {} strategy",
            slots.len(),
            self.strategy.name()
        );

        Ok(LlmManager {
            slots,
            strategy: self.strategy,
            cache,
            ledger,
            inflight: self.single_flight.then(SingleFlight::new),
            shutdown,
        })
    }
}
