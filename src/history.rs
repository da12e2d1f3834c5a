//! Per-session conversation history.
//!
//! Keeps the most recent exchanged messages in a fixed-capacity ring buffer
//! so context sent to providers never grows without bound. The persona
//! preamble is not stored here; it is injected when a snapshot is taken.

use std::collections::VecDeque;

use crate::llm::message::{Message, Role};
use crate::persona::CHARACTER_PROMPT;

/// Default number of messages retained per session.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Recency window of chat messages with FIFO eviction.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    /// Messages stored in insertion order (oldest first).
    messages: VecDeque<Message>,
    /// Maximum number of messages to retain.
    max_messages: usize,
}

impl ChatHistory {
    /// Create a new history with the given capacity.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    /// Append a message, evicting from the front while over capacity.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push_back(Message::new(role, content));
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// The persona preamble followed by the buffered messages.
    ///
    /// Does not mutate the buffer.
    #[must_use]
    pub fn snapshot_with_preamble(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(CHARACTER_PROMPT));
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Buffered messages, oldest first, without the preamble.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Remove every buffered message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_messages
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}
