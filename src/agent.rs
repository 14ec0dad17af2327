//! Agent
//!
//! One Tree of Thought search augmented with live internet search:
//! 1. Search the input (best effort)
//! 2. Run the thought search
//! 3. Ask the model for an answer, allowing one follow-up search request
//!
//! Faults never escape `process`; they come back as a string naming the agent.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::gateway::CallGateway;
use crate::protocol;
use crate::tree_of_thought::{ThoughtOutcome, ThoughtSearch};

/// Substituted for search results when the search service fails
pub const NO_INTERNET_INFO: &str = "No internet information available.";

const RESPONSE_MAX_TOKENS: usize = 4096;

/// Fixed configuration of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    /// Thought search depth bound
    pub depth: usize,
    /// Thought search branching bound
    pub branching: usize,
}

impl AgentIdentity {
    pub fn new(name: &str, depth: usize, branching: usize) -> Self {
        Self {
            name: name.to_string(),
            depth,
            branching,
        }
    }
}

/// Search-augmented Tree of Thought agent
pub struct Agent {
    identity: AgentIdentity,
    search: ThoughtSearch,
    gateway: Arc<CallGateway>,
}

impl Agent {
    pub fn new(identity: AgentIdentity, gateway: Arc<CallGateway>) -> Self {
        let search = ThoughtSearch::new(identity.depth, identity.branching);
        Self {
            identity,
            search,
            gateway,
        }
    }

    /// Internet search through the shared gateway
    pub async fn search_internet(&self, query: &str) -> Result<String> {
        self.gateway.search(query).await
    }

    /// Answer `input`; always returns readable text
    pub async fn process(&self, input: &str) -> String {
        match self.try_process(input).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing input in Agent {}: {}", self.identity.name, e);
                format!("Error processing input in Agent {}: {}", self.identity.name, e)
            }
        }
    }

    async fn try_process(&self, input: &str) -> Result<String> {
        let internet_info = match self.search_internet(input).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Agent {} search failed: {}", self.identity.name, e);
                NO_INTERNET_INFO.to_string()
            }
        };

        let outcome = self.search.process(&self.gateway, input).await;
        debug!(
            "Agent {} resolved {} thoughts",
            self.identity.name,
            outcome.thoughts.len()
        );

        let system = system_prompt(&self.identity.name);
        let prompt = response_prompt(input, &outcome, &internet_info);
        let first = self
            .gateway
            .call_prompt(&system, &prompt, RESPONSE_MAX_TOKENS)
            .await?;

        let gateway = &self.gateway;
        protocol::resolve(
            gateway,
            &system,
            first,
            RESPONSE_MAX_TOKENS,
            "response",
            |query: String| async move { gateway.search(&query).await },
        )
        .await
    }
}

fn system_prompt(name: &str) -> String {
    format!(
        "You are agent {} with direct access to internet search results. \
         Use the thoughts and synthesis from a Tree of Thought analysis, together with the \
         internet information provided, to write a comprehensive response to the input. \
         Include the key insights from the thoughts and explain your reasoning. \
         If the information is not sufficient, you may request one more internet search.",
        name
    )
}

fn response_prompt(input: &str, outcome: &ThoughtOutcome, internet_info: &str) -> String {
    let thoughts = outcome
        .thoughts
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Input: {input}\n\n\
         Tree of Thought process:\n\
         Thoughts:\n{thoughts}\n\n\
         Synthesis: {synthesis}\n\n\
         Internet Information:\n{internet_info}\n\n\
         Based on these thoughts, synthesis, and internet information, provide a comprehensive response. \
         If you need more information, answer with a line starting with \"{marker}\" followed by your search query.",
        input = input,
        thoughts = thoughts,
        synthesis = outcome.synthesis,
        internet_info = internet_info,
        marker = protocol::SEARCH_MARKER,
    )
}
