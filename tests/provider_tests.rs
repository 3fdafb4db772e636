//! Tests for provider adapters against mocked vendor APIs.

use std::sync::Arc;
use std::time::Duration;

use relayllm::{
    create_adapter, FinishReason, GenerateRequest, LlmError, LlmManager, ProviderAdapter, ProviderSettings,
    ProviderType, StrategyKind,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(provider: ProviderType, model: &str, server: &MockServer) -> Arc<dyn ProviderAdapter + Send + Sync> {
    let settings = ProviderSettings {
        endpoint: Some(server.uri()),
        cost_per_token: 0.001,
        timeout: Duration::from_secs(5),
        ..Default::default()
    };
    create_adapter(provider, "test-key".to_string(), model.to_string(), settings).unwrap()
}

fn chat_completion_body(model: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello from the mock"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

// ============================================================================
// ProviderType Tests
// ============================================================================

#[test]
fn test_provider_type_parse() {
    assert_eq!("openai".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
    assert_eq!("Anthropic".parse::<ProviderType>().unwrap(), ProviderType::Anthropic);
    assert_eq!("gemini".parse::<ProviderType>().unwrap(), ProviderType::Google);
    assert_eq!("MISTRAL".parse::<ProviderType>().unwrap(), ProviderType::Mistral);
    assert!("ollama".parse::<ProviderType>().is_err());
}

#[test]
fn test_provider_type_display_and_id() {
    for provider in ProviderType::ALL {
        assert_eq!(provider.as_str().parse::<ProviderType>().unwrap(), provider);
    }
    assert_eq!(ProviderType::OpenAI.to_string(), "OpenAI");
    assert_eq!(ProviderType::Google.as_str(), "google");
}

// ============================================================================
// OpenAI Adapter Tests
// ============================================================================

#[tokio::test]
async fn test_openai_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 64, "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4o-mini")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    let response = adapter
        .generate_content(&GenerateRequest::new("fast", "Say hello", 64))
        .await
        .unwrap();

    assert_eq!(response.content, "Hello from the mock");
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.provider, ProviderType::OpenAI);
    assert_eq!(response.usage.total_tokens, 20);
    assert!((response.cost - 0.02).abs() < 1e-9);
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.request_id, "chatcmpl-123");
}

#[tokio::test]
async fn test_openai_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    match &err {
        LlmError::Authentication(msg) => assert!(msg.contains("Incorrect API key")),
        other => panic!("expected Authentication, got {}", other),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_openai_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    match err {
        LlmError::RateLimit { reset_after, .. } => assert_eq!(reset_after, Some(Duration::from_secs(2))),
        other => panic!("expected RateLimit, got {}", other),
    }
}

#[tokio::test]
async fn test_openai_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Provider { status: Some(503), .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_openai_unparseable_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::ParseError(_)));
}

#[tokio::test]
async fn test_openai_test_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::OpenAI, "gpt-4o", &server);
    assert!(adapter.test_connection().await);
}

// ============================================================================
// Anthropic Adapter Tests
// ============================================================================

#[tokio::test]
async fn test_anthropic_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-haiku-latest",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "there"}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::Anthropic, "claude-3-5-haiku-latest", &server);
    let response = adapter
        .generate_content(&GenerateRequest::new("default", "Say hello", 5))
        .await
        .unwrap();

    assert_eq!(response.content, "Hello there");
    assert_eq!(response.usage.prompt_tokens, 10);
    assert_eq!(response.usage.completion_tokens, 5);
    assert_eq!(response.finish_reason, FinishReason::Length);
    assert_eq!(response.request_id, "msg_01");
}

#[tokio::test]
async fn test_anthropic_overloaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::Anthropic, "claude-3-5-haiku-latest", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Provider { status: Some(529), .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_anthropic_rejects_penalties() {
    let settings = ProviderSettings::default();
    let adapter = create_adapter(ProviderType::Anthropic, "key".into(), "claude".into(), settings).unwrap();

    let request = GenerateRequest::new("default", "hello", 16).frequency_penalty(0.5);
    assert!(matches!(adapter.validate_request(&request), Err(LlmError::Validation(_))));
}

// ============================================================================
// Google Adapter Tests
// ============================================================================

#[tokio::test]
async fn test_google_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 32}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Gemini says hi"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10},
            "modelVersion": "gemini-1.5-flash-002",
            "responseId": "resp-42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::Google, "gemini-1.5-flash", &server);
    let response = adapter
        .generate_content(&GenerateRequest::new("", "Say hello", 32))
        .await
        .unwrap();

    assert_eq!(response.content, "Gemini says hi");
    assert_eq!(response.model, "gemini-1.5-flash-002");
    assert_eq!(response.usage.total_tokens, 10);
    assert_eq!(response.request_id, "resp-42");
}

#[tokio::test]
async fn test_google_no_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::Google, "gemini-1.5-flash", &server);
    let err = adapter
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::ParseError(_)));
}

// ============================================================================
// Mistral Adapter Tests
// ============================================================================

#[tokio::test]
async fn test_mistral_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "mistral-large-latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("mistral-large-latest")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(ProviderType::Mistral, "mistral-small-latest", &server);
    let response = adapter
        .generate_content(&GenerateRequest::new("smart", "hello", 16))
        .await
        .unwrap();

    assert_eq!(response.provider, ProviderType::Mistral);
    assert_eq!(response.model, "mistral-large-latest");
}

#[test]
fn test_mistral_narrow_temperature_range() {
    let adapter =
        create_adapter(ProviderType::Mistral, "key".into(), "mistral-small-latest".into(), ProviderSettings::default())
            .unwrap();

    let ok = GenerateRequest::new("default", "hello", 16).temperature(0.7);
    let too_hot = GenerateRequest::new("default", "hello", 16).temperature(1.5);
    assert!(adapter.validate_request(&ok).is_ok());
    assert!(matches!(adapter.validate_request(&too_hot), Err(LlmError::Validation(_))));
}

#[test]
fn test_mistral_rejects_penalties() {
    let adapter =
        create_adapter(ProviderType::Mistral, "key".into(), "mistral-small-latest".into(), ProviderSettings::default())
            .unwrap();

    let frequency = GenerateRequest::new("default", "hello", 16).frequency_penalty(0.5);
    let presence = GenerateRequest::new("default", "hello", 16).presence_penalty(-1.0);
    let neutral = GenerateRequest::new("default", "hello", 16).presence_penalty(0.0);
    assert!(matches!(adapter.validate_request(&frequency), Err(LlmError::Validation(_))));
    assert!(matches!(adapter.validate_request(&presence), Err(LlmError::Validation(_))));
    assert!(adapter.validate_request(&neutral).is_ok());
}

// ============================================================================
// Model Restriction Tests
// ============================================================================

#[test]
fn test_model_outside_allow_list_rejected() {
    let settings = ProviderSettings {
        models: vec!["gpt-4o-mini".to_string()],
        ..Default::default()
    };
    let adapter = create_adapter(ProviderType::OpenAI, "key".into(), "gpt-4o-mini".into(), settings).unwrap();

    assert_eq!(adapter.list_models(), vec!["gpt-4o-mini".to_string()]);
    let request = GenerateRequest::new("smart", "hello", 16);
    assert!(matches!(adapter.validate_request(&request), Err(LlmError::ModelNotFound(_))));
}

// ============================================================================
// End-to-end Fallback Over HTTP
// ============================================================================

#[tokio::test]
async fn test_manager_falls_back_across_real_adapters() {
    let openai_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": {"message": "internal error"}})))
        .expect(1)
        .mount(&openai_server)
        .await;

    let anthropic_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_fallback",
            "model": "claude-3-5-haiku-latest",
            "content": [{"type": "text", "text": "fallback answer"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&anthropic_server)
        .await;

    let manager = LlmManager::builder()
        .strategy(StrategyKind::Weighted)
        .add_provider(ProviderType::OpenAI, "gpt-4o-mini", "openai-key")
        .custom_endpoint(openai_server.uri())
        .weight(2.0)
        .retry_attempts(1)
        .add_provider(ProviderType::Anthropic, "claude-3-5-haiku-latest", "anthropic-key")
        .custom_endpoint(anthropic_server.uri())
        .build()
        .await
        .unwrap();

    let response = manager
        .generate_content(&GenerateRequest::new("default", "hello", 16))
        .await
        .unwrap();

    assert_eq!(response.provider, ProviderType::Anthropic);
    assert_eq!(response.content, "fallback answer");
    let metrics = manager.get_metrics().await;
    assert_eq!(metrics[&ProviderType::OpenAI].errors, 1);
    assert_eq!(metrics[&ProviderType::Anthropic].successes, 1);
}

#[tokio::test]
async fn test_manager_handles_oversized_vendor_usage() {
    let server = MockServer::start().await;
    let mut body = chat_completion_body("gpt-4o-mini");
    body["usage"] = json!({"prompt_tokens": u32::MAX, "completion_tokens": 1, "total_tokens": u32::MAX});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let manager = LlmManager::builder()
        .add_provider(ProviderType::OpenAI, "gpt-4o-mini", "openai-key")
        .custom_endpoint(server.uri())
        .build()
        .await
        .unwrap();

    let response = manager
        .generate_content(&GenerateRequest::new("default", "count everything", 16))
        .await
        .unwrap();
    assert_eq!(response.usage.total_tokens, u32::MAX);

    manager
        .generate_content(&GenerateRequest::new("default", "and again", 16))
        .await
        .unwrap();
    let usage = manager.total_token_usage().await;
    assert_eq!(usage.prompt_tokens, u32::MAX);
    assert_eq!(usage.total_tokens, u32::MAX);
}
