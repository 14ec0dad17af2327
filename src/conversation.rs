//! Conversation Log
//!
//! In-memory, append-only message history owned by the pipeline.
//! Lives only for the lifetime of the owning instance; nothing is persisted.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message, also the wire shape of a completion request message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation history
///
/// Appends take a write lock, so concurrent writers are serialized and the
/// log stays in call order.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: RwLock<Vec<ConversationMessage>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log
    pub fn push(&self, message: ConversationMessage) {
        let mut messages = self.messages.write();
        messages.push(message);
        debug!("Conversation log now holds {} messages", messages.len());
    }

    /// The most recent `n` messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<ConversationMessage> {
        let messages = self.messages.read();
        let start = messages.len().saturating_sub(n);
        messages[start..].to_vec()
    }

    /// Full copy of the history
    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        self.messages.read().clone()
    }

    /// Append a question and its answer back to back
    ///
    /// Both land under one write lock, so concurrent exchanges never
    /// interleave and an abandoned turn leaves nothing behind.
    pub fn push_exchange(&self, user: ConversationMessage, assistant: ConversationMessage) {
        let mut messages = self.messages.write();
        messages.push(user);
        messages.push(assistant);
        debug!("Conversation log now holds {} messages", messages.len());
    }

    /// Render the last `n` messages as `role: content` lines for prompt context
    pub fn render_context(&self, n: usize) -> String {
        self.recent(n)
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
