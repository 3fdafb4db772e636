/// Module for the backend service adapters
///
/// This module contains one adapter per supported vendor:
/// - Anthropic (Claude models)
/// - OpenAI (GPT models)
/// - Google (Gemini models)
/// - Mistral AI
///
/// Each adapter implements [`ProviderAdapter`], translating the canonical
/// [`GenerateRequest`] into a vendor call and back.

pub mod adapter;
pub mod types;
pub mod anthropic;
pub mod openai;
pub mod google;
pub mod mistral;

pub use types::{
    FinishReason,
    GenerateRequest,
    GenerateResponse,
    ProviderMap,
    ProviderSettings,
    ProviderType,
    RateLimit,
    TokenUsage,
};
pub use adapter::{ProviderAdapter, BaseAdapter, SamplingLimits, create_adapter};
pub use anthropic::AnthropicAdapter;
pub use openai::OpenAIAdapter;
pub use google::GoogleAdapter;
pub use mistral::MistralAdapter;
