use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::constants;
use crate::errors::LlmError;

/// Closed set of backend services the router can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAI,
    Google,
    Mistral,
}

impl ProviderType {
    /// Number of known providers
    pub const COUNT: usize = 4;

    /// Every provider, in declaration order
    pub const ALL: [ProviderType; ProviderType::COUNT] = [
        ProviderType::Anthropic,
        ProviderType::OpenAI,
        ProviderType::Google,
        ProviderType::Mistral,
    ];

    /// Stable slot of this provider in per-provider arrays
    pub fn index(self) -> usize {
        match self {
            ProviderType::Anthropic => 0,
            ProviderType::OpenAI => 1,
            ProviderType::Google => 2,
            ProviderType::Mistral => 3,
        }
    }

    /// Lowercase identifier used in configuration files and logs
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Anthropic => "anthropic",
            ProviderType::OpenAI => "openai",
            ProviderType::Google => "google",
            ProviderType::Mistral => "mistral",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "Anthropic"),
            ProviderType::OpenAI => write!(f, "OpenAI"),
            ProviderType::Google => write!(f, "Google"),
            ProviderType::Mistral => write!(f, "Mistral"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            "google" | "gemini" => Ok(ProviderType::Google),
            "mistral" => Ok(ProviderType::Mistral),
            other => Err(LlmError::ConfigError(format!("Unknown provider type '{}'", other))),
        }
    }
}

/// Fixed-size table holding one value per provider.
#[derive(Debug, Clone)]
pub struct ProviderMap<T> {
    slots: [Option<T>; ProviderType::COUNT],
}

impl<T> Default for ProviderMap<T> {
    fn default() -> Self {
        Self { slots: std::array::from_fn(|_| None) }
    }
}

impl<T> ProviderMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value for `provider`, returning the previous one
    pub fn insert(&mut self, provider: ProviderType, value: T) -> Option<T> {
        self.slots[provider.index()].replace(value)
    }

    pub fn get(&self, provider: ProviderType) -> Option<&T> {
        self.slots[provider.index()].as_ref()
    }

    pub fn contains(&self, provider: ProviderType) -> bool {
        self.slots[provider.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populated entries in provider declaration order
    pub fn iter(&self) -> impl Iterator<Item = (ProviderType, &T)> {
        ProviderType::ALL
            .iter()
            .filter_map(move |p| self.slots[p.index()].as_ref().map(|v| (*p, v)))
    }
}

/// Canonical content-generation request
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GenerateRequest {
    /// Target model identifier or alias (`fast`, `smart`, `default`)
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl GenerateRequest {
    /// Metadata key carrying the caller's user id
    pub const USER_ID_KEY: &'static str = "user_id";

    pub fn new(model: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_tokens,
            ..Default::default()
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.stop.push(sequence.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Adds or overrides an opaque metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attributes the request to a user for cost accounting.
    pub fn user(self, user_id: impl Into<String>) -> Self {
        self.metadata(Self::USER_ID_KEY, Value::String(user_id.into()))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get(Self::USER_ID_KEY).and_then(Value::as_str)
    }

    /// Shape checks that hold for every provider.
    pub fn check_shape(&self) -> Result<(), LlmError> {
        if self.prompt.trim().is_empty() {
            return Err(LlmError::Validation("prompt must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(LlmError::Validation("max_tokens must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Why generation stopped
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map a vendor-specific stop reason onto the canonical set.
    pub fn from_vendor(reason: Option<&str>) -> Self {
        match reason {
            None => FinishReason::Stop,
            Some(r) => match r.to_lowercase().as_str() {
                "stop" | "end_turn" | "stop_sequence" | "finish_reason_unspecified" => FinishReason::Stop,
                "length" | "max_tokens" | "model_length" => FinishReason::Length,
                "content_filter" | "safety" | "recitation" | "blocklist" => FinishReason::ContentFilter,
                _ => FinishReason::Other(r.to_string()),
            },
        }
    }
}

/// Canonical response, produced once per successful call
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateResponse {
    pub content: String,
    /// Vendor model that actually served the request
    pub model: String,
    pub provider: ProviderType,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency: Duration,
    pub finish_reason: FinishReason,
    /// Vendor request id, or a generated one when the vendor sends none
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Accumulate `other`, pinning each counter at `u32::MAX`
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Requests/tokens allowed per rolling minute
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u32>,
}

/// Static per-provider settings, read-only once the manager is built
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Lower values are preferred
    pub priority: u32,
    /// Used by the weighted strategy, higher is preferred
    pub weight: f64,
    pub max_tokens_per_request: u32,
    pub cost_per_token: f64,
    pub rate_limit: RateLimit,
    pub timeout: Duration,
    /// Overrides the provider's default retry attempt budget
    pub retry_attempts: Option<u32>,
    /// Overrides the provider's default base retry delay
    pub retry_delay: Option<Duration>,
    /// Accepted vendor models; empty means anything
    pub models: Vec<String>,
    /// Base URL override
    pub endpoint: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            weight: 1.0,
            max_tokens_per_request: constants::DEFAULT_MAX_TOKENS_PER_REQUEST,
            cost_per_token: 0.0,
            rate_limit: RateLimit::default(),
            timeout: constants::DEFAULT_TIMEOUT,
            retry_attempts: None,
            retry_delay: None,
            models: Vec::new(),
            endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_index_matches_all_order() {
        for (i, provider) in ProviderType::ALL.iter().enumerate() {
            assert_eq!(provider.index(), i);
        }
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
        assert_eq!("gemini".parse::<ProviderType>().unwrap(), ProviderType::Google);
        assert!("cohere".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_provider_map_iterates_in_declaration_order() {
        let mut map = ProviderMap::new();
        map.insert(ProviderType::Mistral, 3);
        map.insert(ProviderType::Anthropic, 1);
        let collected: Vec<_> = map.iter().map(|(p, v)| (p, *v)).collect();
        assert_eq!(collected, vec![(ProviderType::Anthropic, 1), (ProviderType::Mistral, 3)]);
        assert_eq!(map.len(), 2);
        assert!(!map.contains(ProviderType::OpenAI));
    }

    #[test]
    fn test_request_shape_checks() {
        assert!(GenerateRequest::new("m", "hi", 10).check_shape().is_ok());
        assert!(matches!(
            GenerateRequest::new("m", "   ", 10).check_shape(),
            Err(LlmError::Validation(_))
        ));
        assert!(matches!(
            GenerateRequest::new("m", "hi", 0).check_shape(),
            Err(LlmError::Validation(_))
        ));
    }

    #[test]
    fn test_user_metadata() {
        let request = GenerateRequest::new("m", "hi", 10).user("alice");
        assert_eq!(request.user_id(), Some("alice"));
    }

    #[test]
    fn test_token_usage_saturates() {
        let usage = TokenUsage::new(u32::MAX, 1);
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);

        let mut running = TokenUsage::new(u32::MAX - 5, 0);
        running.add(&TokenUsage::new(10, 10));
        assert_eq!(running.prompt_tokens, u32::MAX);
        assert_eq!(running.completion_tokens, 10);
        assert_eq!(running.total_tokens, u32::MAX);
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_vendor(Some("end_turn")), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(FinishReason::from_vendor(Some("SAFETY")), FinishReason::ContentFilter);
        assert_eq!(
            FinishReason::from_vendor(Some("tool_calls")),
            FinishReason::Other("tool_calls".to_string())
        );
    }
}
