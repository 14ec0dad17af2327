//! Claude API Client
//!
//! Anthropic Messages API client used as the completion service.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::conversation::ConversationMessage;
use crate::error::ServiceError;
use crate::services::{CompletionRequest, CompletionService, MAX_COMPLETION_TOKENS, TEMPERATURE};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: &'a [ConversationMessage],
}

/// API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

impl ClaudeClient {
    pub fn new(api_key: Option<&str>, model: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.anthropic_api_key.as_deref(), &config.model)
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionService for ClaudeClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::Auth("ANTHROPIC_API_KEY not set".to_string()))?;

        let body = MessageRequest {
            model: &self.model,
            max_tokens: request.max_tokens.min(MAX_COMPLETION_TOKENS),
            temperature: TEMPERATURE,
            system: &request.system,
            messages: &request.messages,
        };

        debug!(
            "Calling Claude API: model={}, prompt_len={}",
            self.model,
            request.prompt().len()
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &text));
        }

        let result: MessageResponse = response.json().await?;

        let content = result
            .content
            .into_iter()
            .filter_map(|b| if b.r#type == "text" { b.text } else { None })
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            "Claude response: model={}, in={}, out={}",
            self.model, result.usage.input_tokens, result.usage.output_tokens
        );

        Ok(content.trim().to_string())
    }
}
