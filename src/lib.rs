//! Mina: chat relay for a virtual streamer.
//!
//! Browser clients hold a websocket open; every chat message is answered by
//! a remote language model and spoken back as an mp3 clip:
//! Websocket → History → Fallback router → Speech synthesis → Websocket
//!
//! # Architecture
//!
//! - **History**: per-session ring buffer with the persona injected on read
//! - **LLM**: Gemini and OpenAI adapters behind one trait, paired by a
//!   retrying fallback router
//! - **TTS**: Edge read-aloud voices with an ordered voice fallback
//! - **Server**: axum websocket gateway plus static asset serving

pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod persona;
pub mod server;
pub mod tts;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use history::ChatHistory;
pub use llm::FallbackRouter;
pub use server::{AppState, RelayServer};
pub use tts::{SpeechClip, SpeechSynthesizer};
