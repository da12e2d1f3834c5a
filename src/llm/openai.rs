//! OpenAI provider adapter.
//!
//! Uses the non-streaming Chat Completions API (`/v1/chat/completions`).
//! The persona preamble is sent as the `system` message; history entries
//! keep the `user` role and everything else is replayed as `assistant`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mina::config::OpenAiSettings;
//! use mina::llm::message::Message;
//! use mina::llm::openai::OpenAiAdapter;
//! use mina::llm::provider::ProviderAdapter;
//!
//! # async fn example() -> Result<(), mina::llm::error::ProviderError> {
//! let settings = OpenAiSettings { api_key: "sk-...".into(), ..OpenAiSettings::default() };
//! let adapter = OpenAiAdapter::new(settings, reqwest::Client::new());
//! let reply = adapter.complete(&[Message::user("Hello")]).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use super::error::{ProviderError, Result};
use super::message::{Message, Role};
use super::provider::{ProviderAdapter, map_http_error};
use crate::config::OpenAiSettings;
use crate::persona::CHARACTER_PROMPT;

/// Provider name reported in logs and errors.
pub const PROVIDER_NAME: &str = "gpt-3.5";

/// Build the JSON request body for the Chat Completions API.
pub fn build_completions_request(settings: &OpenAiSettings, messages: &[Message]) -> serde_json::Value {
    serde_json::json!({
        "model": settings.model,
        "messages": messages_to_openai(messages),
        "temperature": settings.temperature,
        "max_tokens": settings.max_tokens,
    })
}

/// Convert messages to OpenAI Chat Completions format.
///
/// Always leads with the persona; a system message already present at the
/// head of `messages` is taken as that persona instead of the default.
fn messages_to_openai(messages: &[Message]) -> Vec<serde_json::Value> {
    let (preamble, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (first.content.as_str(), rest),
        _ => (CHARACTER_PROMPT, messages),
    };

    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(serde_json::json!({"role": "system", "content": preamble}));
    out.extend(rest.iter().map(|msg| {
        let role = if msg.role == Role::User { "user" } else { "assistant" };
        serde_json::json!({"role": role, "content": msg.content})
    }));
    out
}

/// Pull `choices[0].message.content` out of a completion response.
fn extract_reply(body: &serde_json::Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}

/// OpenAI provider adapter.
pub struct OpenAiAdapter {
    settings: OpenAiSettings,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.settings.model)
            .field("base_url", &self.settings.base_url)
            .finish()
    }
}

impl OpenAiAdapter {
    /// Create a new OpenAI adapter.
    pub fn new(settings: OpenAiSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn endpoint(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{base}/v1/chat/completions")
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if self.settings.api_key.is_empty() {
            return Err(ProviderError::Config("OPENAI_API_KEY is not set".into()));
        }

        let body = build_completions_request(&self.settings, messages);
        tracing::debug!(
            provider = PROVIDER_NAME,
            messages = messages.len(),
            "calling OpenAI API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER_NAME, status, &body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("OpenAI response not JSON: {e}")))?;

        extract_reply(&json)
            .ok_or_else(|| ProviderError::InvalidResponse("OpenAI response format error".into()))
    }
}
