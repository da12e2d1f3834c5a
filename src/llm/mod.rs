//! Language model providers.
//!
//! Two remote backends sit behind the [`provider::ProviderAdapter`] trait:
//! - **Gemini** (default): Google `generateContent` REST API.
//! - **OpenAI**: Chat Completions API.
//!
//! [`fallback::FallbackRouter`] pairs the configured provider with the other
//! one and turns every conversation into a reply, retrying and falling back
//! as needed.

pub mod error;
pub mod fallback;
pub mod gemini;
pub mod message;
pub mod openai;
pub mod provider;

pub use error::ProviderError;
pub use fallback::{APOLOGY, FallbackRouter};
pub use message::{Message, Role};
pub use provider::ProviderAdapter;
