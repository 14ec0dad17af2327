//! External Service Traits
//!
//! The two opaque oracles the orchestrator drives: a text-completion
//! service and an internet-search service. Concrete clients live in
//! `claude` and `search`; deterministic doubles live in `testing`.

use async_trait::async_trait;
use serde::Serialize;

use crate::conversation::ConversationMessage;
use crate::error::ServiceError;

/// Upper bound the completion service accepts for `max_tokens`
pub const MAX_COMPLETION_TOKENS: usize = 4096;

/// Sampling temperature for every completion
pub const TEMPERATURE: f32 = 0.7;

/// One completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ConversationMessage>,
    pub max_tokens: usize,
}

impl CompletionRequest {
    /// Single user turn under a system prompt; clamps `max_tokens`
    pub fn single(system: &str, prompt: &str, max_tokens: usize) -> Self {
        Self {
            system: system.to_string(),
            messages: vec![ConversationMessage::user(prompt)],
            max_tokens: max_tokens.min(MAX_COMPLETION_TOKENS),
        }
    }

    /// Content of the last user message
    pub fn prompt(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// Text-completion service
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce a completion for the request
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

/// Internet-search service
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Search and return the results rendered as text
    async fn search(&self, query: &str) -> Result<String, ServiceError>;
}
