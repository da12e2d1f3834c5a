//! Provider Contract Tests
//!
//! Verify the exact HTTP exchange of the Gemini and OpenAI adapters against a
//! mock server: request shape, response parsing and error mapping, plus the
//! fallback router driving real adapters.

use std::sync::Arc;
use std::time::Duration;

use mina::config::{GeminiSettings, OpenAiSettings};
use mina::llm::error::ProviderError;
use mina::llm::gemini::GeminiAdapter;
use mina::llm::message::Message;
use mina::llm::openai::OpenAiAdapter;
use mina::llm::provider::{ProviderAdapter, build_http_client};
use mina::llm::{APOLOGY, FallbackRouter};
use mina::persona::CHARACTER_PROMPT;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai(server: &MockServer) -> OpenAiAdapter {
    let settings = OpenAiSettings {
        api_key: "sk-test".into(),
        base_url: server.uri(),
        ..OpenAiSettings::default()
    };
    OpenAiAdapter::new(settings, build_http_client(None).unwrap())
}

fn gemini(server: &MockServer) -> GeminiAdapter {
    let settings = GeminiSettings {
        api_key: "g-test".into(),
        base_url: server.uri(),
        ..GeminiSettings::default()
    };
    GeminiAdapter::new(settings, build_http_client(None).unwrap())
}

fn conversation() -> Vec<Message> {
    vec![
        Message::system(CHARACTER_PROMPT),
        Message::user("hi mina"),
        Message::assistant("hi there~"),
        Message::user("sing for me"),
    ]
}

fn openai_ok(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    }))
}

fn gemini_ok(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn openai_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo",
            "temperature": 0.7,
            "max_tokens": 1000
        })))
        .respond_with(openai_ok("La la la~"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = openai(&server).complete(&conversation()).await.unwrap();
    assert_eq!(reply, "La la la~");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(body["messages"][0]["content"], CHARACTER_PROMPT);
    assert_eq!(body["messages"][3]["content"], "sing for me");
}

#[tokio::test]
async fn openai_missing_content_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&conversation()).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn openai_401_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .mount(&server)
        .await;

    let err = openai(&server).complete(&conversation()).await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthFailed(_)));
    assert!(err.message().contains("Incorrect API key"));
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn openai_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})),
        )
        .mount(&server)
        .await;

    let err = openai(&server).complete(&conversation()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.code(), "RATE_LIMITED");
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_sends_preamble_and_latest_message_only() {
    let server = MockServer::start().await;
    let expected_prompt = format!("{CHARACTER_PROMPT}\n\nsing for me");
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .and(query_param("key", "g-test"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": expected_prompt}]}]
        })))
        .respond_with(gemini_ok("♪ la la ♪"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = gemini(&server).complete(&conversation()).await.unwrap();
    assert_eq!(reply, "♪ la la ♪");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["contents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn gemini_blocked_candidate_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"candidates": [{"finishReason": "SAFETY"}]})),
        )
        .mount(&server)
        .await;

    let err = gemini(&server).complete(&conversation()).await.unwrap_err();
    assert_eq!(err.code(), "RESPONSE_INVALID");
}

#[tokio::test]
async fn gemini_rate_limit_text_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Rate limit exceeded for quota metric"}
        })))
        .mount(&server)
        .await;

    let err = gemini(&server).complete(&conversation()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Provider(_)));
    assert!(err.is_rate_limited());
}

// ────────────────────────────────────────────────────────────────────────────
// Router over real adapters
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn router_switches_to_openai_on_gemini_429() {
    let gemini_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .expect(1)
        .mount(&gemini_server)
        .await;

    let openai_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(openai_ok("from openai"))
        .expect(1)
        .mount(&openai_server)
        .await;

    let router = FallbackRouter::new(
        Arc::new(gemini(&gemini_server)),
        Arc::new(openai(&openai_server)),
    );
    assert_eq!(router.route(&conversation()).await, "from openai");
    assert_eq!(router.fallback_count(), 1);
}

#[tokio::test]
async fn router_retries_server_errors_then_apologises() {
    let gemini_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&gemini_server)
        .await;

    let openai_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&openai_server)
        .await;

    let router = FallbackRouter::new(
        Arc::new(gemini(&gemini_server)),
        Arc::new(openai(&openai_server)),
    )
    .with_backoff_unit(Duration::from_millis(5));

    assert_eq!(router.route(&conversation()).await, APOLOGY);
    assert_eq!(router.primary_attempts(), 3);
}
