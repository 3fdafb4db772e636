use std::time::Duration;

// General
pub const DEFAULT_MAX_TOKENS_PER_REQUEST: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

// Health
pub const HEALTHY_ERROR_RATE_PERCENT: f64 = 10.0;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

// Circuit breaker
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const BREAKER_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);
pub const BREAKER_SUCCESS_THRESHOLD: u32 = 3;
pub const BREAKER_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

// Cache
pub const CACHE_MAX_SIZE: usize = 1000;
pub const CACHE_DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const CACHE_TIME_SENSITIVE_TTL: Duration = Duration::from_secs(300);
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

// Cost ledger
pub const COST_RETENTION_DAYS: i64 = 7;
pub const COST_MAX_RETENTION_DAYS: i64 = 3650;
pub const COST_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
pub const BUDGET_WARNING_PERCENT: f64 = 80.0;
pub const BUDGET_CRITICAL_PERCENT: f64 = 95.0;

// OpenAI
pub const OPENAI_API_BASE: &str = "https://api.openai.com";

// Anthropic
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

// Google
pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com";

// Mistral
pub const MISTRAL_API_BASE: &str = "https://api.mistral.ai";
