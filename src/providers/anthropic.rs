use crate::providers::adapter::{self, BaseAdapter, ProviderAdapter, SamplingLimits};
use crate::providers::types::{FinishReason, GenerateRequest, GenerateResponse, ProviderSettings, ProviderType, TokenUsage};
use crate::errors::{LlmError, LlmResult};
use crate::constants;

use async_trait::async_trait;
use log::debug;
use reqwest::header;
use serde::{Serialize, Deserialize};
use std::time::Instant;

const MODEL_ALIASES: [(&str, &str); 2] = [
    ("fast", "claude-3-5-haiku-latest"),
    ("smart", "claude-3-5-sonnet-latest"),
];

/// Adapter implementation for Anthropic's Messages API (Claude models)
pub struct AnthropicAdapter {
    base: BaseAdapter,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: String,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    /// Creates a new Anthropic adapter
    ///
    /// # Parameters
    /// * `api_key` - Anthropic API key
    /// * `model` - Default model to use (e.g. "claude-3-5-sonnet-latest")
    /// * `settings` - Static provider settings
    pub fn new(api_key: String, model: String, settings: ProviderSettings) -> LlmResult<Self> {
        let base = BaseAdapter::new(ProviderType::Anthropic, api_key, model, settings, constants::ANTHROPIC_API_BASE)?;
        Ok(Self { base })
    }

    fn build_headers(&self) -> Result<header::HeaderMap, LlmError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            header::HeaderValue::from_str(self.base.api_key())
                .map_err(|e| LlmError::ConfigError(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(constants::ANTHROPIC_API_VERSION),
        );
        Ok(headers)
    }

    fn resolve_model(&self, request: &GenerateRequest) -> LlmResult<String> {
        adapter::resolve_model(&request.model, self.base.model(), &MODEL_ALIASES, self.base.settings())
    }

    // Penalties are not part of the Messages API, so any value is refused
    fn limits() -> SamplingLimits {
        SamplingLimits {
            temperature: 0.0..=1.0,
            penalty: 0.0..=0.0,
            max_stop_sequences: 8,
            ..SamplingLimits::default()
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        if !self.base.settings().enabled {
            return Err(LlmError::ProviderDisabled("Anthropic".to_string()));
        }

        let started = Instant::now();
        let payload = AnthropicRequest {
            model: self.resolve_model(request)?,
            messages: vec![AnthropicMessage { role: "user", content: &request.prompt }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: if request.stop.is_empty() { None } else { Some(&request.stop) },
        };

        let response = self.base.client()
            .post(self.base.url("/v1/messages"))
            .headers(self.build_headers()?)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(adapter::error_from_response(ProviderType::Anthropic, response).await);
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::ParseError(format!("Unrecognized Anthropic response: {}", e))
        })?;

        let text = parsed.content.iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<&str>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::ParseError("No text content in Anthropic response".to_string()));
        }

        let usage = TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens);
        debug!("Anthropic answered with model {} using {} tokens", parsed.model, usage.total_tokens);

        Ok(GenerateResponse {
            content: text,
            model: parsed.model,
            provider: ProviderType::Anthropic,
            usage,
            cost: self.base.cost_for(usage.total_tokens),
            latency: started.elapsed(),
            finish_reason: FinishReason::from_vendor(parsed.stop_reason.as_deref()),
            request_id: parsed.id,
        })
    }

    async fn test_connection(&self) -> bool {
        let headers = match self.build_headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        match self.base.client().get(self.base.url("/v1/models")).headers(headers).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Anthropic connection test failed: {}", e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.base.models()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn settings(&self) -> &ProviderSettings {
        self.base.settings()
    }

    fn validate_request(&self, request: &GenerateRequest) -> LlmResult<()> {
        adapter::validate_request(self.base.settings(), request, &Self::limits())?;
        self.resolve_model(request).map(|_| ())
    }
}
