//! Provider adapter trait and shared HTTP plumbing.
//!
//! Adapters translate the normalized message list (persona preamble first)
//! into a backend-specific request and return the reply as plain text.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::{ProviderError, Result};
use super::gemini::GeminiAdapter;
use super::message::Message;
use super::openai::OpenAiAdapter;
use crate::config::{ProviderKind, RelayConfig};

/// Trait for language model provider adapters.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g. `"gemini"`, `"gpt-3.5"`).
    fn name(&self) -> &str;

    /// Send the conversation and return the reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Build the HTTP client shared by the adapters.
///
/// With a proxy endpoint every request is tunnelled through it; without one
/// any `HTTP(S)_PROXY` variables in the environment are ignored.
///
/// # Errors
///
/// Returns [`ProviderError::Config`] if the proxy URL is invalid or the
/// client cannot be built.
pub fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder();
    let builder = match proxy {
        Some(url) => builder.proxy(
            reqwest::Proxy::all(url)
                .map_err(|e| ProviderError::Config(format!("invalid proxy URL {url}: {e}")))?,
        ),
        None => builder.no_proxy(),
    };
    builder
        .build()
        .map_err(|e| ProviderError::Config(format!("HTTP client build failed: {e}")))
}

/// Construct the adapter for `kind` from the startup configuration.
pub fn build_adapter(
    kind: ProviderKind,
    config: &RelayConfig,
    client: reqwest::Client,
) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(config.llm.gemini.clone(), client)),
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(config.llm.openai.clone(), client)),
    }
}

/// Map a non-success HTTP status to the appropriate [`ProviderError`].
pub(crate) fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailed(format!("{provider} authentication failed: {message}")),
        429 => ProviderError::RateLimited(format!("{provider} rate limit exceeded: {message}")),
        code => ProviderError::Provider(format!("{provider} HTTP {code}: {message}")),
    }
}

/// Extract `error.message` from a JSON error body, or return the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_maps_to_auth_failed() {
        let err = map_http_error(
            "gpt-3.5",
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API key"}}"#,
        );
        assert!(matches!(err, ProviderError::AuthFailed(_)));
        assert!(err.message().contains("Invalid API key"));
    }

    #[test]
    fn http_429_maps_to_rate_limited() {
        let err = map_http_error(
            "gemini",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Resource has been exhausted"}}"#,
        );
        assert!(matches!(err, ProviderError::RateLimited(_)));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn http_500_maps_to_provider_error() {
        let err = map_http_error(
            "gemini",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
        );
        assert!(matches!(err, ProviderError::Provider(_)));
        assert!(err.message().contains("Internal Server Error"));
    }

    #[test]
    fn client_builds_with_and_without_proxy() {
        assert!(build_http_client(None).is_ok());
        assert!(build_http_client(Some("http://127.0.0.1:7890")).is_ok());
    }

    #[test]
    fn invalid_proxy_is_config_error() {
        let err = build_http_client(Some("http://[::1")).err();
        assert!(matches!(err, Some(ProviderError::Config(_))));
    }
}
