use crate::providers::adapter::{self, BaseAdapter, ProviderAdapter, SamplingLimits};
use crate::providers::types::{FinishReason, GenerateRequest, GenerateResponse, ProviderSettings, ProviderType, TokenUsage};
use crate::errors::{LlmError, LlmResult};
use crate::constants;

use async_trait::async_trait;
use log::debug;
use reqwest::header;
use serde::{Serialize, Deserialize};
use std::time::Instant;

/// Canonical aliases understood by the OpenAI adapter
const MODEL_ALIASES: [(&str, &str); 2] = [
    ("fast", "gpt-4o-mini"),
    ("smart", "gpt-4o"),
];

/// Adapter implementation for OpenAI's API (GPT models)
pub struct OpenAIAdapter {
    base: BaseAdapter,
}

/// Request body for chat-completions style APIs
/// Shared with other vendors exposing the same wire format
#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: String,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'a [String]>,
    pub stream: bool,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Response structure from chat-completions style APIs
#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub id: Option<String>,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

/// Individual choice from the response
#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Build a chat-completions payload from the canonical request
    pub(crate) fn from_request(request: &'a GenerateRequest, model: String) -> Self {
        Self {
            model,
            messages: vec![ChatMessage { role: "user", content: &request.prompt }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stop: if request.stop.is_empty() { None } else { Some(&request.stop) },
            // Responses are always collected in one piece
            stream: false,
        }
    }
}

/// Send a chat-completions call and map the answer into the canonical response.
pub(crate) async fn send_chat_completion(
    base: &BaseAdapter,
    path: &str,
    payload: &ChatCompletionRequest<'_>,
) -> LlmResult<GenerateResponse> {
    let provider = base.provider_type();
    let started = Instant::now();

    let response = base.client()
        .post(base.url(path))
        .headers(bearer_headers(base.api_key())?)
        .json(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(adapter::error_from_response(provider, response).await);
    }

    let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
        LlmError::ParseError(format!("Unrecognized {} response: {}", provider, e))
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ParseError(format!("No choices in {} response", provider)))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| LlmError::ParseError(format!("Empty message content in {} response", provider)))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    debug!("{} answered with model {} using {} tokens", provider, parsed.model, usage.total_tokens);

    Ok(GenerateResponse {
        content,
        model: parsed.model,
        provider,
        usage,
        cost: base.cost_for(usage.total_tokens),
        latency: started.elapsed(),
        finish_reason: FinishReason::from_vendor(choice.finish_reason.as_deref()),
        request_id: parsed.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    })
}

/// Headers for bearer-token authenticated APIs
pub(crate) fn bearer_headers(api_key: &str) -> Result<header::HeaderMap, LlmError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| LlmError::ConfigError(format!("Invalid API key format: {}", e)))?,
    );
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Ok(headers)
}

impl OpenAIAdapter {
    /// Creates a new OpenAI adapter
    ///
    /// # Parameters
    /// * `api_key` - OpenAI API key
    /// * `model` - Default model to use (e.g. "gpt-4o")
    /// * `settings` - Static provider settings
    pub fn new(api_key: String, model: String, settings: ProviderSettings) -> LlmResult<Self> {
        let base = BaseAdapter::new(ProviderType::OpenAI, api_key, model, settings, constants::OPENAI_API_BASE)?;
        Ok(Self { base })
    }

    fn resolve_model(&self, request: &GenerateRequest) -> LlmResult<String> {
        adapter::resolve_model(&request.model, self.base.model(), &MODEL_ALIASES, self.base.settings())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        if !self.base.settings().enabled {
            return Err(LlmError::ProviderDisabled("OpenAI".to_string()));
        }

        let model = self.resolve_model(request)?;
        let payload = ChatCompletionRequest::from_request(request, model);
        send_chat_completion(&self.base, "/v1/chat/completions", &payload).await
    }

    async fn test_connection(&self) -> bool {
        let headers = match bearer_headers(self.base.api_key()) {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        match self.base.client().get(self.base.url("/v1/models")).headers(headers).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("OpenAI connection test failed: {}", e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.base.models()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn settings(&self) -> &ProviderSettings {
        self.base.settings()
    }

    fn validate_request(&self, request: &GenerateRequest) -> LlmResult<()> {
        adapter::validate_request(self.base.settings(), request, &SamplingLimits::default())?;
        self.resolve_model(request).map(|_| ())
    }
}
