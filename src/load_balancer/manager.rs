use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheStats, ResponseCache};
use crate::config::{self, Config};
use crate::constants;
use crate::cost::{BudgetAlert, BudgetStatus, CostLedger, ProviderCostSummary};
use crate::errors::{LlmError, LlmResult};
use crate::providers::{GenerateRequest, GenerateResponse, ProviderAdapter, ProviderMap, ProviderType, TokenUsage};
use crate::resilience::{retry, BreakerState, CircuitBreaker, RetryPolicy};

use super::builder::LlmManagerBuilder;
use super::inflight::SingleFlight;
use super::strategies::{Candidate, LoadBalancingStrategy};
use super::tracker::ProviderTracker;
use super::types::{HealthStatus, ProviderMetrics};

/// Everything the manager keeps for one provider
pub(crate) struct ProviderSlot {
    pub(crate) adapter: Arc<dyn ProviderAdapter + Send + Sync>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) tracker: Mutex<ProviderTracker>,
    pub(crate) policy: RetryPolicy,
}

/// Routes generation requests across providers.
///
/// Each call goes cache → strategy order → per provider: breaker gate,
/// local validation and rate window, then the retry-wrapped adapter call
/// through the breaker. The first success is cached, billed and returned.
pub struct LlmManager {
    pub(crate) slots: ProviderMap<ProviderSlot>,
    pub(crate) strategy: Box<dyn LoadBalancingStrategy>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) ledger: Arc<CostLedger>,
    pub(crate) inflight: Option<SingleFlight>,
    /// Stops the background tasks when the manager goes away
    pub(crate) shutdown: CancellationToken,
}

impl LlmManager {
    /// Creates a builder for configuring an LlmManager
    pub fn builder() -> LlmManagerBuilder {
        LlmManagerBuilder::new()
    }

    /// Build a manager from an already parsed configuration
    pub async fn from_config(config: Config) -> LlmResult<Self> {
        LlmManagerBuilder::from_config(config)?.build().await
    }

    /// Load a TOML configuration file and build a manager from it
    pub async fn from_config_file<P: AsRef<Path>>(path: P) -> LlmResult<Self> {
        Self::from_config(config::load_config(path)?).await
    }

    pub async fn from_config_str(content: &str) -> LlmResult<Self> {
        Self::from_config(config::parse_config(content)?).await
    }

    /// Generate content, falling back across providers until one succeeds
    ///
    /// # Parameters
    /// * `request` - The canonical request
    ///
    /// # Returns
    /// * The first successful response, or `AllProvidersFailed` carrying the last error
    pub async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        self.generate_content_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`generate_content`](Self::generate_content), abandoning the call once `cancel` fires.
    ///
    /// Cancellation stops the running attempt or backoff sleep and returns
    /// [`LlmError::Cancelled`] without trying further providers.
    pub async fn generate_content_with_cancel(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> LlmResult<GenerateResponse> {
        request.check_shape()?;
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let key = cache::fingerprint(request);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let _flight = match &self.inflight {
            Some(inflight) => {
                let guard = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    guard = inflight.acquire(&key) => guard,
                };
                // Another caller may have filled the cache while we waited
                if let Some(hit) = self.peek_cached(&key).await {
                    return Ok(hit);
                }
                Some(guard)
            }
            None => None,
        };

        self.dispatch(request, &key, cancel).await
    }

    async fn cached(&self, key: &str) -> Option<GenerateResponse> {
        let hit = self.cache.get(key).await;
        #[cfg(feature = "metrics")]
        match hit {
            Some(_) => crate::metrics::record_cache_hit(),
            None => crate::metrics::record_cache_miss(),
        }
        if hit.is_some() {
            debug!("Cache hit for request {}", &key[..12]);
        }
        hit
    }

    /// Second lookup after waiting on an in-flight twin; counted like the first
    async fn peek_cached(&self, key: &str) -> Option<GenerateResponse> {
        let hit = self.cache.get(key).await;
        if hit.is_some() {
            #[cfg(feature = "metrics")]
            crate::metrics::record_cache_hit();
            debug!("Request {} served by a concurrent identical call", &key[..12]);
        }
        hit
    }

    /// Enabled providers in the order the active strategy wants them tried
    async fn ordered_candidates(&self) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(self.slots.len());
        for (provider, slot) in self.slots.iter() {
            let settings = slot.adapter.settings();
            if !settings.enabled {
                continue;
            }
            let avg_latency = slot.tracker.lock().await.avg_latency();
            candidates.push(Candidate {
                provider,
                priority: settings.priority,
                weight: settings.weight,
                cost_per_token: settings.cost_per_token,
                avg_latency,
            });
        }
        candidates.sort_by_key(|c| c.priority);
        self.strategy.order(&mut candidates);
        candidates
    }

    async fn dispatch(
        &self,
        request: &GenerateRequest,
        key: &str,
        cancel: &CancellationToken,
    ) -> LlmResult<GenerateResponse> {
        let candidates = self.ordered_candidates().await;
        if candidates.is_empty() {
            return Err(LlmError::ConfigError("No enabled providers configured".to_string()));
        }
        debug!(
            "{} order: {:?}",
            self.strategy.name(),
            candidates.iter().map(|c| c.provider).collect::<Vec<_>>()
        );

        let attempted = candidates.len();
        let mut last_error = None;

        for candidate in candidates {
            let Some(slot) = self.slots.get(candidate.provider) else {
                continue;
            };
            let provider = candidate.provider;

            if !slot.breaker.is_call_permitted().await {
                debug!("Skipping {}: circuit breaker open", provider);
                last_error = Some(LlmError::CircuitOpen(provider.to_string()));
                continue;
            }

            if let Err(e) = slot.adapter.validate_request(request) {
                warn!("Skipping {}: {}", provider, e);
                last_error = Some(e);
                continue;
            }

            let estimated_tokens = estimated_tokens(request);
            if let Err(e) = slot
                .tracker
                .lock()
                .await
                .try_admit(&slot.adapter.settings().rate_limit, estimated_tokens)
            {
                warn!("Skipping {}: {}", provider, e);
                #[cfg(feature = "metrics")]
                crate::metrics::record_rate_limit(provider.as_str());
                last_error = Some(e);
                continue;
            }

            let started = Instant::now();
            let (result, attempts) = call_provider(slot, request, cancel).await;
            let latency = started.elapsed();

            match result {
                Ok(mut response) => {
                    response.latency = latency;
                    self.on_success(slot, key, request, &response, attempts).await;
                    return Ok(response);
                }
                Err(LlmError::Cancelled) => {
                    info!("Request cancelled while calling {}", provider);
                    return Err(LlmError::Cancelled);
                }
                // The breaker opened between the gate check and the call
                Err(e @ LlmError::CircuitOpen(_)) => {
                    debug!("Skipping {}: {}", provider, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        "{} failed after {} attempt(s) in {:?}: {}; trying next provider",
                        provider, attempts, latency, e
                    );
                    self.on_failure(slot, request, &e, attempts, latency).await;
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| LlmError::ConfigError("No provider was attempted".to_string()));
        error!("All {} providers failed; last error: {}", attempted, last);
        #[cfg(feature = "metrics")]
        crate::metrics::record_fallback_exhausted();
        Err(LlmError::AllProvidersFailed { attempted, last: Box::new(last) })
    }

    async fn on_success(
        &self,
        slot: &ProviderSlot,
        key: &str,
        request: &GenerateRequest,
        response: &GenerateResponse,
        attempts: u32,
    ) {
        let provider = response.provider;
        {
            let mut tracker = slot.tracker.lock().await;
            tracker.record_success(response.latency, response.cost, &response.usage);
            tracker.record_retries(attempts.saturating_sub(1));
        }
        #[cfg(feature = "metrics")]
        {
            crate::metrics::record_request_success(
                provider.as_str(),
                &response.model,
                response.latency,
                &response.usage,
                response.cost,
            );
            crate::metrics::record_retries(provider.as_str(), attempts.saturating_sub(1));
        }

        self.cache.set(key, response.clone(), self.cache.ttl_for(request)).await;
        self.ledger
            .record(
                provider,
                &response.model,
                response.cost,
                response.usage.total_tokens,
                &response.request_id,
                request.user_id(),
            )
            .await;

        debug!(
            "{} served request {} in {:?} ({} tokens, ${:.6})",
            provider, response.request_id, response.latency, response.usage.total_tokens, response.cost
        );
    }

    async fn on_failure(
        &self,
        slot: &ProviderSlot,
        request: &GenerateRequest,
        error: &LlmError,
        attempts: u32,
        latency: Duration,
    ) {
        let mut tracker = slot.tracker.lock().await;
        tracker.record_failure(latency, error);
        tracker.record_retries(attempts.saturating_sub(1));
        #[cfg(feature = "metrics")]
        {
            let provider = slot.adapter.provider_type();
            crate::metrics::record_request_failure(provider.as_str(), &request.model, error, latency);
            crate::metrics::record_retries(provider.as_str(), attempts.saturating_sub(1));
        }
    }

    /// Health of every configured provider
    pub async fn get_health_status(&self) -> HashMap<ProviderType, HealthStatus> {
        let mut health = HashMap::new();
        for (provider, slot) in self.slots.iter() {
            let breaker_state = slot.breaker.state().await;
            let tracker = slot.tracker.lock().await;
            let error_rate = tracker.error_rate();
            let healthy = error_rate < constants::HEALTHY_ERROR_RATE_PERCENT && breaker_state != BreakerState::Open;

            #[cfg(feature = "metrics")]
            crate::metrics::set_provider_health(provider.as_str(), healthy);

            health.insert(
                provider,
                HealthStatus {
                    provider,
                    healthy,
                    enabled: slot.adapter.settings().enabled,
                    breaker_state,
                    avg_latency: tracker.avg_latency(),
                    error_rate,
                    consecutive_errors: tracker.consecutive_errors,
                    last_error: tracker.last_error_message.clone(),
                },
            );
        }
        health
    }

    /// Running counters of every configured provider
    pub async fn get_metrics(&self) -> HashMap<ProviderType, ProviderMetrics> {
        let mut metrics = HashMap::new();
        for (provider, slot) in self.slots.iter() {
            let breaker = slot.breaker.snapshot().await;
            let tracker = slot.tracker.lock().await;
            metrics.insert(
                provider,
                ProviderMetrics {
                    provider,
                    requests: tracker.requests,
                    successes: tracker.successes,
                    errors: tracker.errors,
                    total_latency: tracker.total_latency,
                    avg_latency: tracker.avg_latency(),
                    total_cost: tracker.total_cost,
                    consecutive_errors: tracker.consecutive_errors,
                    error_rate: tracker.error_rate(),
                    last_request: tracker.last_request,
                    last_error: tracker.last_error,
                    usage: tracker.usage,
                    retries: tracker.retries,
                    rate_limited: tracker.rate_limited,
                    breaker_state: breaker.state,
                    breaker_rejections: breaker.rejected_calls,
                    breaker_times_opened: breaker.times_opened,
                },
            );
        }
        metrics
    }

    /// Per-provider spend over the retained cost entries
    pub async fn get_cost_summary(&self) -> HashMap<ProviderType, ProviderCostSummary> {
        self.ledger.summary().await
    }

    pub async fn budget_status(&self, provider: ProviderType) -> BudgetStatus {
        self.ledger.budget_status(provider).await
    }

    pub async fn budget_alerts(&self) -> Vec<BudgetAlert> {
        self.ledger.alerts().await
    }

    /// Token usage summed over every provider
    pub async fn total_token_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for (_, slot) in self.slots.iter() {
            total.add(&slot.tracker.lock().await.usage);
        }
        total
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn cost_ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub async fn breaker_state(&self, provider: ProviderType) -> Option<BreakerState> {
        match self.slots.get(provider) {
            Some(slot) => Some(slot.breaker.state().await),
            None => None,
        }
    }

    /// Force a provider's breaker closed
    pub async fn reset_breaker(&self, provider: ProviderType) -> LlmResult<()> {
        let slot = self
            .slots
            .get(provider)
            .ok_or_else(|| LlmError::ProviderDisabled(provider.to_string()))?;
        slot.breaker.reset().await;
        Ok(())
    }

    /// Probe every provider's API, returning which ones answered
    pub async fn test_connections(&self) -> HashMap<ProviderType, bool> {
        let probes = self.slots.iter().map(|(provider, slot)| async move {
            (provider, slot.adapter.test_connection().await)
        });
        futures::future::join_all(probes).await.into_iter().collect()
    }

    /// Number of configured providers, enabled or not
    pub fn get_provider_count(&self) -> usize {
        self.slots.len()
    }

    pub fn providers(&self) -> Vec<ProviderType> {
        self.slots.iter().map(|(provider, _)| provider).collect()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Stop background maintenance tasks. Also happens on drop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for LlmManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Prompt tokens at roughly four characters each, plus the output budget
fn estimated_tokens(request: &GenerateRequest) -> u32 {
    let prompt_tokens = request.prompt.chars().count().div_ceil(4);
    (prompt_tokens as u64 + request.max_tokens as u64).min(u32::MAX as u64) as u32
}

/// One provider attempt: retry loop inside the breaker, each try bounded by the provider timeout
///
/// # Returns
/// * The outcome and the number of attempts the retry loop made
async fn call_provider(
    slot: &ProviderSlot,
    request: &GenerateRequest,
    cancel: &CancellationToken,
) -> (LlmResult<GenerateResponse>, u32) {
    let mut attempts = 0;
    let attempts_out = &mut attempts;
    let timeout = slot.adapter.settings().timeout;
    let provider = slot.adapter.provider_type();

    let result = slot
        .breaker
        .execute(move || async move {
            let outcome = retry::execute(&slot.policy, cancel, move |attempt| async move {
                debug!("{} attempt {}", provider, attempt);
                match tokio::time::timeout(timeout, slot.adapter.generate_content(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(timeout)),
                }
            })
            .await;

            match outcome {
                Ok(success) => {
                    *attempts_out = success.attempts;
                    Ok(success.value)
                }
                Err(failure) => {
                    *attempts_out = failure.attempts();
                    Err(failure.error)
                }
            }
        })
        .await;

    (result, attempts)
}
