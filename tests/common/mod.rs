//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use relayllm::{
    FinishReason, GenerateRequest, GenerateResponse, LlmError, LlmResult, ProviderAdapter, ProviderSettings,
    ProviderType, TokenUsage,
};

/// How a [`MockAdapter`] answers
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Retryable 503 on every call
    AlwaysFail,
    /// Retryable 503 for the first `n` calls, then success
    FailFirst(u32),
    /// Non-retryable 401 on every call
    Unauthorized,
    /// Never answers
    Hang,
}

pub struct MockAdapter {
    provider: ProviderType,
    settings: ProviderSettings,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockAdapter {
    pub fn new(provider: ProviderType, behavior: Behavior) -> Self {
        Self {
            provider,
            settings: ProviderSettings::default(),
            behavior,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut ProviderSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    /// Sleep this long before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> LlmError {
        LlmError::Provider {
            message: format!("{} upstream unavailable", self.provider),
            status: Some(503),
            retryable: true,
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    async fn generate_content(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.behavior {
            Behavior::Succeed => {}
            Behavior::AlwaysFail => return Err(self.unavailable()),
            Behavior::FailFirst(n) if call <= n => return Err(self.unavailable()),
            Behavior::FailFirst(_) => {}
            Behavior::Unauthorized => {
                return Err(LlmError::Authentication(format!("{} rejected the API key", self.provider)))
            }
            Behavior::Hang => std::future::pending::<()>().await,
        }

        let usage = TokenUsage::new(10, 20);
        Ok(GenerateResponse {
            content: format!("{} says hi", self.provider),
            model: request.model.clone(),
            provider: self.provider,
            usage,
            cost: usage.total_tokens as f64 * self.settings.cost_per_token,
            latency: Duration::ZERO,
            finish_reason: FinishReason::Stop,
            request_id: format!("{}-{}", self.provider.as_str(), call),
        })
    }

    async fn test_connection(&self) -> bool {
        !matches!(self.behavior, Behavior::AlwaysFail | Behavior::Unauthorized)
    }

    fn list_models(&self) -> Vec<String> {
        self.settings.models.clone()
    }

    fn provider_type(&self) -> ProviderType {
        self.provider
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

pub fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest::new("m1", prompt, 50)
}
