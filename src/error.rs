//! Error types for the mina relay.

/// Top-level error type for the chat relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Language model provider error.
    #[error("provider error: {0}")]
    Provider(#[from] crate::llm::error::ProviderError),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(#[from] crate::tts::TtsError),

    /// HTTP / websocket server error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
