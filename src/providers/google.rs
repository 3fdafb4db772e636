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
    ("fast", "gemini-1.5-flash"),
    ("smart", "gemini-1.5-pro"),
];

/// Adapter implementation for Google's Gemini models
pub struct GoogleAdapter {
    base: BaseAdapter,
}

/// Request structure for Google's generateContent API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerateContentRequest<'a> {
    contents: Vec<GoogleRequestContent<'a>>,
    generation_config: GoogleGenerationConfig<'a>,
}

#[derive(Serialize)]
struct GoogleRequestContent<'a> {
    role: &'static str,
    parts: Vec<GoogleRequestPart<'a>>,
}

#[derive(Serialize)]
struct GoogleRequestPart<'a> {
    text: &'a str,
}

/// Generation configuration for Google's Gemini API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig<'a> {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

/// Response structure from Google's generateContent API
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerateContentResponse {
    candidates: Vec<GoogleCandidate>,
    usage_metadata: Option<GoogleUsageMetadata>,
    model_version: Option<String>,
    response_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleResponseContent {
    #[serde(default)]
    parts: Vec<GoogleResponsePart>,
}

#[derive(Deserialize)]
struct GoogleResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GoogleAdapter {
    /// Creates a new Google adapter
    ///
    /// # Parameters
    /// * `api_key` - Google API key
    /// * `model` - Default model to use (e.g. "gemini-1.5-pro")
    /// * `settings` - Static provider settings
    pub fn new(api_key: String, model: String, settings: ProviderSettings) -> LlmResult<Self> {
        let base = BaseAdapter::new(ProviderType::Google, api_key, model, settings, constants::GOOGLE_API_BASE)?;
        Ok(Self { base })
    }

    fn build_headers(&self) -> Result<header::HeaderMap, LlmError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            header::HeaderValue::from_str(self.base.api_key())
                .map_err(|e| LlmError::ConfigError(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    fn resolve_model(&self, request: &GenerateRequest) -> LlmResult<String> {
        adapter::resolve_model(&request.model, self.base.model(), &MODEL_ALIASES, self.base.settings())
    }

    fn limits() -> SamplingLimits {
        SamplingLimits {
            max_stop_sequences: 5,
            ..SamplingLimits::default()
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        if !self.base.settings().enabled {
            return Err(LlmError::ProviderDisabled("Google".to_string()));
        }

        let started = Instant::now();
        let model = self.resolve_model(request)?;
        let payload = GoogleGenerateContentRequest {
            contents: vec![GoogleRequestContent {
                role: "user",
                parts: vec![GoogleRequestPart { text: &request.prompt }],
            }],
            generation_config: GoogleGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
                frequency_penalty: request.frequency_penalty,
                presence_penalty: request.presence_penalty,
                stop_sequences: if request.stop.is_empty() { None } else { Some(&request.stop) },
            },
        };

        let url = self.base.url(&format!("/v1beta/models/{}:generateContent", model));
        let response = self.base.client()
            .post(url)
            .headers(self.build_headers()?)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(adapter::error_from_response(ProviderType::Google, response).await);
        }

        let parsed: GoogleGenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::ParseError(format!("Unrecognized Google response: {}", e))
        })?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("No candidates in Google response".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        let finish_reason = FinishReason::from_vendor(candidate.finish_reason.as_deref());
        if text.is_empty() && finish_reason != FinishReason::ContentFilter {
            return Err(LlmError::ParseError("No text content in Google response".to_string()));
        }

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();
        let served_model = parsed.model_version.unwrap_or(model);
        debug!("Google answered with model {} using {} tokens", served_model, usage.total_tokens);

        Ok(GenerateResponse {
            content: text,
            model: served_model,
            provider: ProviderType::Google,
            usage,
            cost: self.base.cost_for(usage.total_tokens),
            latency: started.elapsed(),
            finish_reason,
            request_id: parsed.response_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        })
    }

    async fn test_connection(&self) -> bool {
        let headers = match self.build_headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        match self.base.client().get(self.base.url("/v1beta/models")).headers(headers).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Google connection test failed: {}", e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.base.models()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Google
    }

    fn settings(&self) -> &ProviderSettings {
        self.base.settings()
    }

    fn validate_request(&self, request: &GenerateRequest) -> LlmResult<()> {
        adapter::validate_request(self.base.settings(), request, &Self::limits())?;
        self.resolve_model(request).map(|_| ())
    }
}
