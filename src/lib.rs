//! relayllm routes content-generation requests across interchangeable AI providers.
//!
//! A single [`LlmManager::generate_content`] call looks the request up in a
//! TTL + LRU response cache, orders the configured providers with a
//! load-balancing strategy, and tries them in turn. Every provider call runs
//! inside a retry loop with exponential backoff, wrapped by a per-provider
//! circuit breaker. The first success is cached and billed to a cost ledger
//! that tracks budgets and raises alerts.
//!
//! # Features
//!
//! - **Providers**: OpenAI, Anthropic, Google (Gemini) and Mistral behind one [`ProviderAdapter`] trait
//! - **Strategies**: round-robin, weighted, least-latency and cost-optimized ordering
//! - **Failure isolation**: circuit breakers, bounded retries, per-call timeouts, local rate windows
//! - **Caching**: fingerprinted responses with shorter TTLs for time-sensitive prompts
//! - **Spend tracking**: per-provider summaries and daily/weekly/monthly budget alerts
//! - **Metrics** (feature `metrics`): counters and histograms through the `metrics` facade
//!
//! # Example
//!
//! ```no_run
//! use relayllm::{GenerateRequest, LlmManager, ProviderType, StrategyKind};
//!
//! async fn example() -> relayllm::LlmResult<()> {
//!     let manager = LlmManager::builder()
//!         .strategy(StrategyKind::CostOptimized)
//!         .add_provider(ProviderType::OpenAI, "gpt-4o-mini", "openai-key")
//!         .cost_per_token(0.0000006)
//!         .add_provider(ProviderType::Anthropic, "claude-3-5-haiku-latest", "anthropic-key")
//!         .cost_per_token(0.000004)
//!         .build()
//!         .await?;
//!
//!     let request = GenerateRequest::new("fast", "Explain Rust in one paragraph", 256);
//!     let response = manager.generate_content(&request).await?;
//!     println!("{} answered: {}", response.provider, response.content);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod cost;
pub mod errors;
pub mod load_balancer;
pub mod providers;
pub mod resilience;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use providers::{
    ProviderType,
    ProviderAdapter,
    ProviderSettings,
    GenerateRequest,
    GenerateResponse,
    FinishReason,
    TokenUsage,
    RateLimit,
    create_adapter,
};

pub use errors::{LlmError, LlmResult};

pub use load_balancer::{LlmManager, LlmManagerBuilder, StrategyKind, HealthStatus, ProviderMetrics};

pub use cache::{CacheConfig, CacheStats};
pub use cost::{BudgetLimits, BudgetAlert, ProviderCostSummary};
pub use resilience::{BreakerConfig, BreakerState, RetryPolicy};

pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
pub use metrics::describe_metrics;

/// Initialize the logging system
///
/// This should be called at the start of your application in case
/// you want to activate the library's debug and info logging.
pub fn use_logging() {
    env_logger::init();
}
