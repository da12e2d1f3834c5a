//! Google Gemini provider adapter.
//!
//! Talks to the REST `generateContent` endpoint. Gemini receives a single
//! user turn made of the persona preamble and the newest user message; the
//! rest of the history is not forwarded to this backend.

use async_trait::async_trait;

use super::error::{ProviderError, Result};
use super::message::{Message, Role};
use super::provider::{ProviderAdapter, map_http_error};
use crate::config::GeminiSettings;
use crate::persona::CHARACTER_PROMPT;

/// Provider name reported in logs and errors.
pub const PROVIDER_NAME: &str = "gemini";

/// Build the combined prompt: preamble, a blank line, then the newest user text.
pub fn build_prompt(messages: &[Message]) -> String {
    let preamble = messages
        .first()
        .filter(|m| m.role == Role::System)
        .map_or(CHARACTER_PROMPT, |m| m.content.as_str());
    let latest = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map_or("", |m| m.content.as_str());
    format!("{preamble}\n\n{latest}")
}

/// Build the JSON request body for `generateContent`.
pub fn build_generate_request(messages: &[Message]) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": build_prompt(messages)}],
        }]
    })
}

/// Pull `candidates[0].content.parts[*].text` out of a response.
fn extract_reply(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Gemini provider adapter.
pub struct GeminiAdapter {
    settings: GeminiSettings,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("model", &self.settings.model)
            .field("base_url", &self.settings.base_url)
            .finish()
    }
}

impl GeminiAdapter {
    /// Create a new Gemini adapter.
    pub fn new(settings: GeminiSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if self.settings.api_key.is_empty() {
            return Err(ProviderError::Config("GOOGLE_API_KEY is not set".into()));
        }

        let body = build_generate_request(messages);
        tracing::debug!(provider = PROVIDER_NAME, model = %self.settings.model, "calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER_NAME, status, &body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Gemini response not JSON: {e}")))?;

        extract_reply(&json)
            .ok_or_else(|| ProviderError::InvalidResponse("Gemini response format error".into()))
    }
}
