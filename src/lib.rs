//! Claude MoA
//!
//! Research assistant combining a Mixture of Agents with per-agent Tree of
//! Thought search and live internet search.
//!
//! # Features
//!
//! - **Layered Agents**: every agent in a layer answers the same input; a synthesis feeds the next layer
//! - **Tree of Thought**: bounded breadth-first search over evaluated reasoning steps
//! - **Search Augmentation**: one web search per agent plus one model-requested follow-up
//! - **Call Gateway**: shared sliding-window quotas, jittered exponential backoff, per-attempt deadline
//! - **Chunking**: long input and output split on sentence boundaries
//!
//! # Architecture
//!
//! ```text
//! AiAssistant ──► MixtureOfAgents ──► Agent ──► ThoughtSearch
//!   (chunks)        (layers)           │            │
//!                                      └─────┬──────┘
//!                                            ▼
//!                                       CallGateway ──► Claude API
//!                                      (quota+retry) ──► Tavily API
//! ```

pub mod agent;
pub mod assistant;
pub mod chunker;
pub mod claude;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod protocol;
pub mod rate_limit;
pub mod recovery;
pub mod search;
pub mod services;
pub mod testing;
pub mod thought;
pub mod tokenizer;
pub mod tree_of_thought;

pub use agent::{Agent, AgentIdentity};
pub use assistant::{AiAssistant, AssistantSettings, ResponseTone};
pub use chunker::{chunk_text, Chunks};
pub use claude::ClaudeClient;
pub use config::{Config, LayerSpec, Topology};
pub use conversation::{ConversationLog, ConversationMessage, Role};
pub use error::{OrchestrationError, ServiceError};
pub use gateway::{CallGateway, GatewayConfig, GatewayStats};
pub use pipeline::{MixtureOfAgents, PipelineOutput};
pub use protocol::Reply;
pub use rate_limit::{RateLimitConfig, SlidingWindowLimiter};
pub use recovery::RetryPolicy;
pub use search::TavilyClient;
pub use services::{CompletionRequest, CompletionService, SearchService};
pub use thought::{Evaluation, Thought};
pub use tokenizer::TokenCounter;
pub use tree_of_thought::{ThoughtOutcome, ThoughtSearch};
