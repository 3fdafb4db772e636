//! TOML-based configuration for the LlmManager.
//!
//! Everything the builder can do can also be declared in a file.
//!
//! # Example Configuration File
//!
//! ```toml
//! [settings]
//! strategy = "cost_optimized"
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! recovery_timeout_secs = 60
//!
//! [[providers]]
//! type = "openai"
//! model = "gpt-4o-mini"
//! api_key = "${OPENAI_API_KEY}"
//! cost_per_token = 0.0000006
//! requests_per_minute = 500
//!
//! [[providers]]
//! type = "anthropic"
//! model = "claude-3-5-haiku-latest"
//! api_key = "${ANTHROPIC_API_KEY}"
//! priority = 1
//!
//! [[budgets]]
//! provider = "openai"
//! daily = 5.0
//! monthly = 100.0
//! ```
//!
//! # Environment Variables
//!
//! API keys and endpoints can reference environment variables using the
//! `${VAR_NAME}` syntax. These are resolved at load time.

mod types;
mod loader;

pub use types::{BreakerSection, BudgetConfig, CacheSection, Config, CostSection, ProviderConfig, Settings};
pub use loader::{load_config, parse_config};
pub(crate) use loader::validate_config;
