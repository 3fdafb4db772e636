use std::error::Error;
use std::fmt;
use std::time::Duration;
use serde_json;

/// Substrings that mark a vendor failure as transient
const TRANSIENT_KEYWORDS: [&str; 8] = [
    "timeout",
    "timed out",
    "overloaded",
    "temporarily unavailable",
    "service unavailable",
    "connection reset",
    "try again",
    "bad gateway",
];

/// HTTP status codes that are always worth retrying
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Custom error types for provider routing
#[derive(Debug)]
pub enum LlmError {
    /// Malformed request, rejected before any network call
    Validation(String),
    /// Credentials were rejected by the provider
    Authentication(String),
    /// The requested model is unknown to the provider
    ModelNotFound(String),
    /// The request exceeds the provider's token limit
    TokenLimit(String),
    /// Rate limiting error, optionally carrying the provider's reset hint
    RateLimit {
        message: String,
        reset_after: Option<Duration>,
    },
    /// Any other failure reported by the provider
    Provider {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },
    /// Error from the HTTP client
    RequestError(reqwest::Error),
    /// Parsing error
    ParseError(String),
    /// The call did not finish within the provider's timeout
    Timeout(Duration),
    /// The provider's circuit breaker rejected the call
    CircuitOpen(String),
    /// The caller abandoned the request
    Cancelled,
    /// Provider is disabled
    ProviderDisabled(String),
    /// Configuration error
    ConfigError(String),
    /// Every provider in the fallback chain failed
    AllProvidersFailed {
        attempted: usize,
        last: Box<LlmError>,
    },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Validation(msg) => write!(f, "Validation error: {}", msg),
            LlmError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            LlmError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            LlmError::TokenLimit(msg) => write!(f, "Token limit error: {}", msg),
            LlmError::RateLimit { message, reset_after } => match reset_after {
                Some(after) => write!(f, "Rate limit error: {} (resets in {:?})", message, after),
                None => write!(f, "Rate limit error: {}", message),
            },
            LlmError::Provider { message, status: Some(status), .. } => {
                write!(f, "Provider error ({}): {}", status, message)
            }
            LlmError::Provider { message, .. } => write!(f, "Provider error: {}", message),
            LlmError::RequestError(err) => write!(f, "Request error: {}", err),
            LlmError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LlmError::Timeout(after) => write!(f, "Request timed out after {:?}", after),
            LlmError::CircuitOpen(provider) => write!(f, "Circuit breaker open for provider: {}", provider),
            LlmError::Cancelled => write!(f, "Request cancelled"),
            LlmError::ProviderDisabled(provider) => write!(f, "Provider disabled: {}", provider),
            LlmError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LlmError::AllProvidersFailed { attempted, last } => {
                write!(f, "All {} providers failed; last error: {}", attempted, last)
            }
        }
    }
}

impl Error for LlmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LlmError::RequestError(err) => Some(err),
            LlmError::AllProvidersFailed { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

/// Convert reqwest errors to LlmError
impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::RequestError(err)
    }
}

/// Convert serde_json errors to LlmError
impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::ParseError(err.to_string())
    }
}

/// Convert std::io::Error to LlmError
impl From<std::io::Error> for LlmError {
    fn from(err: std::io::Error) -> Self {
        LlmError::ConfigError(err.to_string())
    }
}

/// Convert toml parsing errors to LlmError
impl From<toml::de::Error> for LlmError {
    fn from(err: toml::de::Error) -> Self {
        LlmError::ConfigError(err.to_string())
    }
}

/// Result type alias for routing operations
pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Classify a failed vendor response into the error taxonomy.
    ///
    /// # Parameters
    /// * `status` - HTTP status returned by the vendor
    /// * `error_message` - Body or message extracted from the response
    /// * `reset_after` - Parsed `retry-after` hint, if the vendor sent one
    pub fn from_api_response(
        status: reqwest::StatusCode,
        error_message: String,
        reset_after: Option<Duration>,
    ) -> Self {
        let code = status.as_u16();
        let msg_lower = error_message.to_lowercase();

        if code == 401 || code == 403 {
            return LlmError::Authentication(error_message);
        }

        if code == 429
            || msg_lower.contains("rate limit")
            || msg_lower.contains("too many requests")
            || msg_lower.contains("quota exceeded")
            || msg_lower.contains("throttle")
        {
            return LlmError::RateLimit { message: error_message, reset_after };
        }

        if msg_lower.contains("model")
            && (msg_lower.contains("not found") || msg_lower.contains("does not exist"))
        {
            return LlmError::ModelNotFound(error_message);
        }

        if code == 413
            || msg_lower.contains("maximum context length")
            || msg_lower.contains("too many tokens")
            || msg_lower.contains("token limit")
        {
            return LlmError::TokenLimit(error_message);
        }

        let retryable = RETRYABLE_STATUS.contains(&code) || is_transient_message(&msg_lower);
        LlmError::Provider { message: error_message, status: Some(code), retryable }
    }

    /// Whether this error class is worth another attempt against the same provider
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimit { .. } | LlmError::Timeout(_) => true,
            LlmError::Provider { retryable, .. } => *retryable,
            LlmError::RequestError(err) => {
                err.is_timeout() || err.is_connect() || is_transient_message(&err.to_string().to_lowercase())
            }
            _ => false,
        }
    }

    /// Errors that can never succeed on retry, whatever the policy says
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            LlmError::Validation(_)
                | LlmError::Authentication(_)
                | LlmError::ModelNotFound(_)
                | LlmError::TokenLimit(_)
                | LlmError::Cancelled
                | LlmError::ProviderDisabled(_)
                | LlmError::ConfigError(_)
        )
    }

    /// Whether this failure says something about the provider's health.
    ///
    /// Client-side rejections (bad request shape, token limits, unknown
    /// models, cancellation) do not count against a circuit breaker.
    pub fn counts_against_provider(&self) -> bool {
        !matches!(
            self,
            LlmError::Validation(_)
                | LlmError::TokenLimit(_)
                | LlmError::ModelNotFound(_)
                | LlmError::Cancelled
                | LlmError::CircuitOpen(_)
                | LlmError::ProviderDisabled(_)
                | LlmError::ConfigError(_)
        )
    }

    /// Reset hint carried by rate limit errors
    pub fn reset_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimit { reset_after, .. } => *reset_after,
            _ => None,
        }
    }
}

fn is_transient_message(msg_lower: &str) -> bool {
    TRANSIENT_KEYWORDS.iter().any(|k| msg_lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_auth_statuses_are_authentication_errors() {
        let err = LlmError::from_api_response(StatusCode::UNAUTHORIZED, "bad key".into(), None);
        assert!(matches!(err, LlmError::Authentication(_)));
        assert!(!err.is_retryable());

        let err = LlmError::from_api_response(StatusCode::FORBIDDEN, "denied".into(), None);
        assert!(matches!(err, LlmError::Authentication(_)));
    }

    #[test]
    fn test_rate_limit_keeps_reset_hint() {
        let err = LlmError::from_api_response(
            StatusCode::TOO_MANY_REQUESTS,
            "slow down".into(),
            Some(Duration::from_secs(3)),
        );
        assert!(err.is_retryable());
        assert_eq!(err.reset_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_model_not_found_from_message() {
        let err = LlmError::from_api_response(
            StatusCode::NOT_FOUND,
            "The model `gpt-9` does not exist".into(),
            None,
        );
        assert!(matches!(err, LlmError::ModelNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_token_limit_from_message() {
        let err = LlmError::from_api_response(
            StatusCode::BAD_REQUEST,
            "This model's maximum context length is 8192 tokens".into(),
            None,
        );
        assert!(matches!(err, LlmError::TokenLimit(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500u16, 502, 503, 504] {
            let status = StatusCode::from_u16(status).unwrap();
            let err = LlmError::from_api_response(status, "boom".into(), None);
            assert!(err.is_retryable(), "{} should be retryable", status);
        }
    }

    #[test]
    fn test_transient_keywords_make_bad_request_retryable() {
        let err = LlmError::from_api_response(StatusCode::BAD_REQUEST, "Engine overloaded".into(), None);
        assert!(err.is_retryable());

        let err = LlmError::from_api_response(StatusCode::BAD_REQUEST, "invalid json".into(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_aggregate_display_mentions_last_error() {
        let err = LlmError::AllProvidersFailed {
            attempted: 2,
            last: Box::new(LlmError::Provider {
                message: "upstream exploded".into(),
                status: Some(500),
                retryable: true,
            }),
        };
        let text = err.to_string();
        assert!(text.contains("All 2 providers failed"));
        assert!(text.contains("upstream exploded"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_client_side_errors_do_not_count_against_provider() {
        assert!(!LlmError::TokenLimit("x".into()).counts_against_provider());
        assert!(!LlmError::Cancelled.counts_against_provider());
        assert!(LlmError::Timeout(Duration::from_secs(1)).counts_against_provider());
        assert!(LlmError::Authentication("x".into()).counts_against_provider());
    }
}
