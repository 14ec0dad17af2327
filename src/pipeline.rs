//! Mixture-of-Agents Pipeline
//!
//! Ordered layers of agents. Every agent in a layer sees the same input
//! (recent history + current text); their outputs are synthesized into the
//! next layer's input. The last synthesis is the pipeline's answer.
//!
//! Agents within a layer run concurrently up to `agent_concurrency`; outputs
//! are assembled in agent order, not completion order.

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::agent::Agent;
use crate::config::Topology;
use crate::conversation::{ConversationLog, ConversationMessage};
use crate::gateway::CallGateway;
use crate::protocol;

/// History messages fed to each layer as context
pub const CONTEXT_MESSAGES: usize = 5;

const SYNTHESIS_MAX_TOKENS: usize = 4096;

/// One layer of independently configured agents
struct Layer {
    agents: Vec<Agent>,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Synthesis of the last layer
    pub synthesis: String,
    /// Raw agent outputs, layer by layer, in agent order
    pub layer_outputs: Vec<String>,
}

/// Multi-layer agent pipeline owning the conversation history
pub struct MixtureOfAgents {
    layers: Vec<Layer>,
    gateway: Arc<CallGateway>,
    history: ConversationLog,
    agent_concurrency: usize,
}

impl MixtureOfAgents {
    /// Build from a validated topology; all agents share `gateway`
    pub fn new(topology: &Topology, gateway: Arc<CallGateway>, agent_concurrency: usize) -> Result<Self> {
        topology.validate()?;

        let layers = topology
            .layers
            .iter()
            .map(|spec| Layer {
                agents: spec
                    .agents
                    .iter()
                    .map(|identity| Agent::new(identity.clone(), Arc::clone(&gateway)))
                    .collect(),
            })
            .collect::<Vec<_>>();

        info!(
            "Mixture of Agents ready: {} layers, {} agents",
            layers.len(),
            layers.iter().map(|l| l.agents.len()).sum::<usize>()
        );

        Ok(Self {
            layers,
            gateway,
            history: ConversationLog::new(),
            agent_concurrency: agent_concurrency.max(1),
        })
    }

    /// Copy of the conversation so far
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.history.snapshot()
    }

    /// Run every layer over `input`
    ///
    /// The exchange is recorded only once the last synthesis exists; a run
    /// dropped midway leaves the history untouched.
    pub async fn process(&self, input: &str) -> PipelineOutput {
        let mut current = input.to_string();
        let mut layer_outputs = Vec::new();

        for (index, layer) in self.layers.iter().enumerate() {
            debug!("Running layer {} ({} agents)", index, layer.agents.len());
            let outputs = self.process_layer(layer, &current).await;
            current = self.synthesize_layer_outputs(&outputs).await;
            layer_outputs.extend(outputs);
        }

        self.history.push_exchange(
            ConversationMessage::user(input),
            ConversationMessage::assistant(current.clone()),
        );

        PipelineOutput {
            synthesis: current,
            layer_outputs,
        }
    }

    async fn process_layer(&self, layer: &Layer, input: &str) -> Vec<String> {
        let context = self.history.render_context(CONTEXT_MESSAGES);
        let prompt = format!("Context:\n{}\n\nCurrent Input: {}", context, input);

        stream::iter(layer.agents.iter().map(|agent| agent.process(&prompt)))
            .buffered(self.agent_concurrency)
            .collect()
            .await
    }

    async fn synthesize_layer_outputs(&self, outputs: &[String]) -> String {
        let mut prompt = outputs
            .iter()
            .enumerate()
            .map(|(i, output)| format!("Agent {} output: {}", i + 1, output))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!(
            "\n\nSynthesize these outputs. If you need more information, answer with a line starting with \"{}\" followed by your search query.",
            protocol::SEARCH_MARKER
        ));

        match self.try_synthesize(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!("Error in synthesis: {}", e);
                format!("Error in synthesis: {}", e)
            }
        }
    }

    async fn try_synthesize(&self, prompt: &str) -> crate::error::Result<String> {
        let first = self
            .gateway
            .call_prompt(SYNTHESIS_SYSTEM_PROMPT, prompt, SYNTHESIS_MAX_TOKENS)
            .await?;

        // Follow-up searches go through the first agent of the first layer
        let executor = self.layers.first().and_then(|l| l.agents.first());
        let gateway = &self.gateway;
        protocol::resolve(
            gateway,
            SYNTHESIS_SYSTEM_PROMPT,
            first,
            SYNTHESIS_MAX_TOKENS,
            "synthesis",
            |query: String| async move {
                match executor {
                    Some(agent) => agent.search_internet(&query).await,
                    None => gateway.search(&query).await,
                }
            },
        )
        .await
    }
}

const SYNTHESIS_SYSTEM_PROMPT: &str =
    "You are an AI assistant synthesizing the outputs of several agents. Each agent had \
     internet search results and a Tree of Thought analysis. Combine their outputs into one \
     coherent response, highlighting key insights and where the agents differ. If you need \
     more information, you may request one more internet search.";
