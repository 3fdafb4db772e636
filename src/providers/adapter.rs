use crate::providers::types::{GenerateRequest, GenerateResponse, ProviderSettings, ProviderType};
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::openai::OpenAIAdapter;
use crate::providers::google::GoogleAdapter;
use crate::providers::mistral::MistralAdapter;
use crate::errors::{LlmError, LlmResult};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;

/// Common interface for every backend service
///
/// An adapter translates the canonical request into a vendor call and the
/// vendor answer back into a [`GenerateResponse`]. It never retries or
/// falls back on its own; the manager composes those concerns around it.
#[async_trait]
pub trait ProviderAdapter {
    /// Perform one generation call against the vendor
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Cheap liveness probe against the vendor API
    async fn test_connection(&self) -> bool;

    /// Models this adapter will accept
    fn list_models(&self) -> Vec<String>;

    /// Which provider slot this adapter fills
    fn provider_type(&self) -> ProviderType;

    /// Static settings the adapter was built with
    fn settings(&self) -> &ProviderSettings;

    /// Upper bound on what the request would cost, before sending it
    fn estimate_cost(&self, request: &GenerateRequest) -> f64 {
        estimate_cost(self.settings(), request)
    }

    /// Reject requests this provider cannot serve, before any network call
    fn validate_request(&self, request: &GenerateRequest) -> LlmResult<()> {
        validate_request(self.settings(), request, &SamplingLimits::default())
    }
}

/// Accepted ranges for sampling parameters
#[derive(Debug, Clone)]
pub struct SamplingLimits {
    pub temperature: RangeInclusive<f32>,
    pub top_p: RangeInclusive<f32>,
    pub penalty: RangeInclusive<f32>,
    pub max_stop_sequences: usize,
}

impl Default for SamplingLimits {
    fn default() -> Self {
        Self {
            temperature: 0.0..=2.0,
            top_p: 0.0..=1.0,
            penalty: -2.0..=2.0,
            max_stop_sequences: 4,
        }
    }
}

/// Shared request validation
///
/// Empty prompts and bad sampling values are `Validation` errors; a request
/// asking for more output than the provider allows is a `TokenLimit` error.
/// Both are non-retryable.
pub fn validate_request(settings: &ProviderSettings, request: &GenerateRequest, limits: &SamplingLimits) -> LlmResult<()> {
    request.check_shape()?;

    if request.max_tokens > settings.max_tokens_per_request {
        return Err(LlmError::TokenLimit(format!(
            "requested {} tokens but the provider allows at most {}",
            request.max_tokens, settings.max_tokens_per_request
        )));
    }

    check_range("temperature", request.temperature, &limits.temperature)?;
    check_range("top_p", request.top_p, &limits.top_p)?;
    check_range("frequency_penalty", request.frequency_penalty, &limits.penalty)?;
    check_range("presence_penalty", request.presence_penalty, &limits.penalty)?;

    if request.stop.len() > limits.max_stop_sequences {
        return Err(LlmError::Validation(format!(
            "at most {} stop sequences are supported, got {}",
            limits.max_stop_sequences,
            request.stop.len()
        )));
    }

    Ok(())
}

fn check_range(name: &str, value: Option<f32>, range: &RangeInclusive<f32>) -> LlmResult<()> {
    match value {
        Some(v) if !range.contains(&v) => Err(LlmError::Validation(format!(
            "{} must be within {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            v
        ))),
        _ => Ok(()),
    }
}

/// Rough cost ceiling: prompt tokens (about four characters each) plus the full output budget
pub fn estimate_cost(settings: &ProviderSettings, request: &GenerateRequest) -> f64 {
    let prompt_tokens = (request.prompt.chars().count() as f64 / 4.0).ceil();
    (prompt_tokens + request.max_tokens as f64) * settings.cost_per_token
}

/// Resolve a canonical model name to a vendor model id.
///
/// Empty names and `default` map to the adapter's default model; aliases
/// map through `aliases`. When the provider is restricted to a model list,
/// anything outside of it is rejected with `ModelNotFound`.
pub fn resolve_model(
    requested: &str,
    default_model: &str,
    aliases: &[(&str, &str)],
    settings: &ProviderSettings,
) -> LlmResult<String> {
    let requested = requested.trim();
    let resolved = if requested.is_empty() || requested.eq_ignore_ascii_case("default") {
        default_model.to_string()
    } else {
        aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(requested))
            .map(|(_, vendor)| vendor.to_string())
            .unwrap_or_else(|| requested.to_string())
    };

    if !settings.models.is_empty() && !settings.models.iter().any(|m| m == &resolved) {
        return Err(LlmError::ModelNotFound(format!(
            "model '{}' is not enabled for this provider (available: {})",
            resolved,
            settings.models.join(", ")
        )));
    }

    Ok(resolved)
}

/// Base adapter implementation with common functionality
///
/// Handles properties shared across all vendors:
/// - HTTP client with the provider timeout
/// - API key storage
/// - Default model and settings
/// - Endpoint override
pub struct BaseAdapter {
    provider_type: ProviderType,
    client: Client,
    api_key: String,
    model: String,
    settings: ProviderSettings,
    base_url: String,
}

impl BaseAdapter {
    /// Create a new BaseAdapter
    ///
    /// # Parameters
    /// * `provider_type` - Which vendor this adapter talks to
    /// * `api_key` - API key for authentication
    /// * `model` - Default model identifier
    /// * `settings` - Static provider settings
    /// * `default_base_url` - Vendor base URL used unless `settings.endpoint` overrides it
    pub fn new(
        provider_type: ProviderType,
        api_key: String,
        model: String,
        settings: ProviderSettings,
        default_base_url: &str,
    ) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| default_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { provider_type, client, api_key, model, settings, base_url })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Default model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Join the base URL with an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cost of a finished call given its token usage
    pub fn cost_for(&self, total_tokens: u32) -> f64 {
        total_tokens as f64 * self.settings.cost_per_token
    }

    /// Models accepted by this adapter: the configured list, or the default model
    pub fn models(&self) -> Vec<String> {
        if self.settings.models.is_empty() {
            vec![self.model.clone()]
        } else {
            self.settings.models.clone()
        }
    }
}

#[derive(Deserialize)]
struct VendorErrorEnvelope {
    error: VendorErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VendorErrorBody {
    Detailed { message: String },
    Plain(String),
}

/// Turn a non-success HTTP response into a classified error.
///
/// Pulls the message out of the usual `{"error": {"message": ..}}` or
/// `{"error": ".."}` envelopes, falling back to the raw body.
pub async fn error_from_response(provider: ProviderType, response: Response) -> LlmError {
    let status = response.status();
    let reset_after = retry_after_hint(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    let message = match serde_json::from_str::<VendorErrorEnvelope>(&body) {
        Ok(VendorErrorEnvelope { error: VendorErrorBody::Detailed { message } }) => message,
        Ok(VendorErrorEnvelope { error: VendorErrorBody::Plain(message) }) => message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body,
    };

    LlmError::from_api_response(status, format!("{} API error: {}", provider, message), reset_after)
}

/// Parse a `retry-after` header given in whole or fractional seconds
pub fn retry_after_hint(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Factory function to create an adapter based on provider type
///
/// # Parameters
/// * `provider_type` - Which vendor to talk to
/// * `api_key` - API key for authentication
/// * `model` - Default model identifier
/// * `settings` - Static provider settings
///
/// # Returns
/// * Arc-wrapped trait object implementing ProviderAdapter
pub fn create_adapter(
    provider_type: ProviderType,
    api_key: String,
    model: String,
    settings: ProviderSettings,
) -> LlmResult<Arc<dyn ProviderAdapter + Send + Sync>> {
    Ok(match provider_type {
        ProviderType::Anthropic => Arc::new(AnthropicAdapter::new(api_key, model, settings)?),
        ProviderType::OpenAI => Arc::new(OpenAIAdapter::new(api_key, model, settings)?),
        ProviderType::Google => Arc::new(GoogleAdapter::new(api_key, model, settings)?),
        ProviderType::Mistral => Arc::new(MistralAdapter::new(api_key, model, settings)?),
    })
}
