//! JSON payloads exchanged with browser clients.

use serde::{Deserialize, Serialize};

use crate::tts::SpeechClip;

/// Error text for payloads that are not a JSON object of the expected shape.
pub const INVALID_FORMAT: &str = "Invalid message format";

/// Error text for payloads without usable content.
pub const EMPTY_MESSAGE: &str = "Empty message";

/// Prefix for failures raised while a turn is being processed.
pub const PROCESSING_ERROR_PREFIX: &str = "Error processing message: ";

fn default_kind() -> String {
    "chat".to_owned()
}

/// Inbound websocket payload: `{content, type?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    /// Raw content; anything other than a non-empty string is rejected.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    /// Message kind, `"chat"` when omitted.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

/// A validated chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Viewer text.
    pub content: String,
    /// Message kind.
    pub kind: String,
}

/// Parse and validate one inbound frame.
///
/// # Errors
///
/// Returns the error payload to send back: [`INVALID_FORMAT`] for anything
/// that is not a JSON object with string content, [`EMPTY_MESSAGE`] when the
/// content is missing or empty.
pub fn parse_client_message(raw: &str) -> Result<ChatRequest, ServerMessage> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|_| ServerMessage::error(INVALID_FORMAT))?;
    if !value.is_object() {
        return Err(ServerMessage::error(INVALID_FORMAT));
    }
    let msg: ClientMessage =
        serde_json::from_value(value).map_err(|_| ServerMessage::error(INVALID_FORMAT))?;

    match msg.content {
        None | Some(serde_json::Value::Null) => Err(ServerMessage::error(EMPTY_MESSAGE)),
        Some(serde_json::Value::String(s)) if s.is_empty() => Err(ServerMessage::error(EMPTY_MESSAGE)),
        Some(serde_json::Value::String(content)) => Ok(ChatRequest {
            content,
            kind: msg.kind,
        }),
        Some(_) => Err(ServerMessage::error(INVALID_FORMAT)),
    }
}

/// Successful turn reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Reply text (or the apology).
    pub message: String,
    /// Emotion tag for the avatar.
    pub emotion: String,
    /// Avatar motion chosen for the emotion.
    pub motion: String,
    /// Spoken version of the reply, absent when synthesis failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<SpeechClip>,
}

/// Outbound websocket payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{message, emotion, motion, audio_url?}`
    Reply(ChatReply),
    /// `{error}`
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl ServerMessage {
    /// Build an error payload.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Build a turn-processing error payload.
    pub fn processing_error(detail: impl std::fmt::Display) -> Self {
        Self::error(format!("{PROCESSING_ERROR_PREFIX}{detail}"))
    }
}

/// Query for `POST /speech`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechQuery {
    /// Text to speak.
    #[serde(default)]
    pub text: String,
}

/// Response for `POST /speech`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechResponse {
    /// Whether a clip was produced.
    pub success: bool,
    /// Public path of the clip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeechResponse {
    /// A produced clip.
    pub fn ok(audio_path: impl Into<String>) -> Self {
        Self {
            success: true,
            audio_path: Some(audio_path.into()),
            error: None,
        }
    }

    /// A failed request.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            audio_path: None,
            error: Some(error.into()),
        }
    }
}
