//! Label helpers for consistent metric labeling

use crate::errors::LlmError;
use crate::providers::ProviderType;

/// Standard label keys
pub mod keys {
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Convert ProviderType to label value string
pub fn provider_label(provider: ProviderType) -> &'static str {
    provider.as_str()
}

/// Convert LlmError to error type label string
pub fn error_type_label(error: &LlmError) -> &'static str {
    match error {
        LlmError::Validation(_) => "validation",
        LlmError::Authentication(_) => "authentication",
        LlmError::ModelNotFound(_) => "model_not_found",
        LlmError::TokenLimit(_) => "token_limit",
        LlmError::RateLimit { .. } => "rate_limit",
        LlmError::Provider { .. } => "provider_error",
        LlmError::RequestError(_) => "request_error",
        LlmError::ParseError(_) => "parse_error",
        LlmError::Timeout(_) => "timeout",
        LlmError::CircuitOpen(_) => "circuit_open",
        LlmError::Cancelled => "cancelled",
        LlmError::ProviderDisabled(_) => "provider_disabled",
        LlmError::ConfigError(_) => "config_error",
        LlmError::AllProvidersFailed { .. } => "all_providers_failed",
    }
}
