//! Error types for provider adapters.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`ProviderError::code()`].
//!
//! Rate limiting is detected two ways: the structured [`ProviderError::RateLimited`]
//! variant (HTTP 429) and, for backends that only describe throttling in prose,
//! a case-insensitive match of [`RATE_LIMIT_SIGNAL`] against the message text.

/// Substring that marks an error message as a throttling response.
pub const RATE_LIMIT_SIGNAL: &str = "rate limit exceeded";

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Provider throttled the request.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Request to the provider failed before a response arrived.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Response arrived but carried no usable text.
    pub const RESPONSE_INVALID: &str = "RESPONSE_INVALID";

    /// Request exceeded its deadline.
    pub const TIMEOUT: &str = "TIMEOUT";

    /// Provider-specific error not covered by other variants.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced by provider adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthFailed(String),

    /// Provider throttled the request (HTTP 429).
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Network or transport failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Response format error.
    #[error("[{}] {}", error_codes::RESPONSE_INVALID, .0)]
    InvalidResponse(String),

    /// Per-call deadline elapsed.
    #[error("[{}] {}", error_codes::TIMEOUT, .0)]
    Timeout(String),

    /// Any other non-success status from the backend.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Provider(String),
}

impl ProviderError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::AuthFailed(_) => error_codes::AUTH_FAILED,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::InvalidResponse(_) => error_codes::RESPONSE_INVALID,
            Self::Timeout(_) => error_codes::TIMEOUT,
            Self::Provider(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::AuthFailed(m)
            | Self::RateLimited(m)
            | Self::Request(m)
            | Self::InvalidResponse(m)
            | Self::Timeout(m)
            | Self::Provider(m) => m,
        }
    }

    /// Returns true if the provider signalled throttling.
    ///
    /// Any message containing [`RATE_LIMIT_SIGNAL`] counts, whatever its
    /// true cause.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
            || self.message().to_lowercase().contains(RATE_LIMIT_SIGNAL)
    }
}

/// Convenience alias for adapter results.
pub type Result<T> = std::result::Result<T, ProviderError>;
