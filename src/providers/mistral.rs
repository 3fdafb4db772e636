use crate::providers::adapter::{self, BaseAdapter, ProviderAdapter, SamplingLimits};
use crate::providers::openai::{bearer_headers, send_chat_completion, ChatCompletionRequest};
use crate::providers::types::{GenerateRequest, GenerateResponse, ProviderSettings, ProviderType};
use crate::errors::{LlmError, LlmResult};
use crate::constants;

use async_trait::async_trait;
use log::debug;

const MODEL_ALIASES: [(&str, &str); 2] = [
    ("fast", "mistral-small-latest"),
    ("smart", "mistral-large-latest"),
];

/// Adapter implementation for Mistral AI's API
///
/// Mistral speaks the chat-completions wire format, but has a narrower
/// temperature range and does not accept frequency/presence penalties.
pub struct MistralAdapter {
    base: BaseAdapter,
}

impl MistralAdapter {
    /// Creates a new Mistral adapter
    ///
    /// # Parameters
    /// * `api_key` - Mistral API key
    /// * `model` - Default model to use (e.g. "mistral-large-latest")
    /// * `settings` - Static provider settings
    pub fn new(api_key: String, model: String, settings: ProviderSettings) -> LlmResult<Self> {
        let base = BaseAdapter::new(ProviderType::Mistral, api_key, model, settings, constants::MISTRAL_API_BASE)?;
        Ok(Self { base })
    }

    fn resolve_model(&self, request: &GenerateRequest) -> LlmResult<String> {
        adapter::resolve_model(&request.model, self.base.model(), &MODEL_ALIASES, self.base.settings())
    }

    fn limits() -> SamplingLimits {
        SamplingLimits {
            temperature: 0.0..=1.0,
            penalty: 0.0..=0.0,
            ..SamplingLimits::default()
        }
    }
}

#[async_trait]
impl ProviderAdapter for MistralAdapter {
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        if !self.base.settings().enabled {
            return Err(LlmError::ProviderDisabled("Mistral".to_string()));
        }

        let model = self.resolve_model(request)?;
        let mut payload = ChatCompletionRequest::from_request(request, model);
        payload.frequency_penalty = None;
        payload.presence_penalty = None;
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
                debug!("Mistral connection test failed: {}", e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.base.models()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Mistral
    }

    fn settings(&self) -> &ProviderSettings {
        self.base.settings()
    }

    fn validate_request(&self, request: &GenerateRequest) -> LlmResult<()> {
        adapter::validate_request(self.base.settings(), request, &Self::limits())?;
        self.resolve_model(request).map(|_| ())
    }
}
