//! Per-connection chat sessions.
//!
//! Each websocket owns one [`Session`] and therefore one [`ChatHistory`].
//! Turns run strictly one after another per connection; separate
//! connections proceed independently. The only shared state is the
//! [`SessionRegistry`] of live connections.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use super::protocol::{ChatReply, ChatRequest, INVALID_FORMAT, ServerMessage, parse_client_message};
use crate::history::ChatHistory;
use crate::llm::message::Role;
use crate::persona::{DEFAULT_EMOTION, motion_for_emotion};
use crate::tts::timestamped_filename;

/// Process-wide set of live sessions, keyed by id with their connect time.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Instant>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session and return its id.
    pub fn register(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Instant::now());
        id
    }

    /// Forget a session. Returns `false` if it was not registered.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its session from the registry when dropped.
struct Registration {
    registry: Arc<SessionRegistry>,
    id: Uuid,
}

impl Registration {
    fn new(registry: Arc<SessionRegistry>) -> Self {
        let id = registry.register();
        Self { registry, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// One connected client and its conversation.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    history: ChatHistory,
}

impl Session {
    /// Create a session with an empty history of `max_messages`.
    pub fn new(id: Uuid, max_messages: usize) -> Self {
        Self {
            id,
            history: ChatHistory::new(max_messages),
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Conversation so far.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Handle one inbound text frame and produce the payload to send back.
    ///
    /// Invalid frames leave the history untouched. A panic inside the turn
    /// is reported as a processing error and the session stays usable.
    pub async fn handle_frame(&mut self, state: &AppState, raw: &str) -> ServerMessage {
        let request = match parse_client_message(raw) {
            Ok(request) => request,
            Err(reply) => return reply,
        };

        match AssertUnwindSafe(self.run_turn(state, request)).catch_unwind().await {
            Ok(reply) => ServerMessage::Reply(reply),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "internal error".to_owned());
                warn!(session = %self.id, error = %detail, "turn failed");
                ServerMessage::processing_error(detail)
            }
        }
    }

    async fn run_turn(&mut self, state: &AppState, request: ChatRequest) -> ChatReply {
        debug!(session = %self.id, kind = %request.kind, "chat turn");
        self.history.add(Role::User, request.content);

        let reply = state.router.route(&self.history.snapshot_with_preamble()).await;

        let audio_url = match state.speech.synthesize(&reply, &timestamped_filename()).await {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!(session = %self.id, error = %e, "speech synthesis failed, replying with text only");
                None
            }
        };

        let out = ChatReply {
            message: reply.clone(),
            emotion: DEFAULT_EMOTION.to_owned(),
            motion: motion_for_emotion(DEFAULT_EMOTION).to_owned(),
            audio_url,
        };
        self.history.add(Role::Assistant, reply);
        out
    }
}

/// Drive one websocket until the client goes away.
pub async fn run_session(socket: WebSocket, state: AppState) {
    let registration = Registration::new(Arc::clone(&state.sessions));
    let mut session = Session::new(registration.id, state.config.history.max_messages);
    info!(session = %session.id, live = state.sessions.len(), "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!(session = %session.id, "websocket receive error: {err}");
                break;
            }
        };

        let reply = match message {
            Message::Text(text) => session.handle_frame(&state, text.as_str()).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => session.handle_frame(&state, text).await,
                Err(_) => ServerMessage::error(INVALID_FORMAT),
            },
            // The websocket layer answers pings itself.
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        match serde_json::to_string(&reply) {
            Ok(json) => {
                if out_tx.send(Message::Text(json.into())).is_err() {
                    break;
                }
            }
            Err(e) => warn!(session = %session.id, "failed to encode reply: {e}"),
        }
    }

    drop(out_tx);
    let _ = writer.await;
    drop(registration);
    info!(session = %session.id, live = state.sessions.len(), "client disconnected");
}
