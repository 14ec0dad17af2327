//! Assistant
//!
//! Top-level entry point. Fits arbitrarily long input to the completion
//! budget by chunking, runs the agent pipeline per chunk, then turns the
//! combined pipeline output into a final answer in the requested tone.
//!
//! Nothing fails past `respond`: every outcome is readable text.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chunker::chunk_text;
use crate::config::{Config, Topology};
use crate::conversation::ConversationMessage;
use crate::gateway::CallGateway;
use crate::pipeline::MixtureOfAgents;

/// Returned for a final-synthesis chunk whose call failed
pub const CHUNK_APOLOGY: &str =
    "I apologize, but I'm unable to provide a response at the moment. Please try again later.";

/// Returned when `respond` runs past its deadline
pub const DEADLINE_REPLY: &str =
    "I apologize, but I couldn't finish researching this in time. Please try again later.";

/// Length register of the final answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTone {
    Concise,
    Comprehensive,
}

impl ResponseTone {
    pub fn from_concise(concise: bool) -> Self {
        if concise {
            Self::Concise
        } else {
            Self::Comprehensive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concise => "concise",
            Self::Comprehensive => "comprehensive",
        }
    }
}

/// Tunables for `AiAssistant`
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub max_tokens: usize,
    pub chunk_tokens: usize,
    pub chunk_concurrency: usize,
    pub respond_timeout: Duration,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            chunk_tokens: 4096,
            chunk_concurrency: 1,
            respond_timeout: Duration::from_secs(180),
        }
    }
}

impl From<&Config> for AssistantSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_tokens: config.max_tokens,
            chunk_tokens: config.chunk_tokens,
            chunk_concurrency: config.chunk_concurrency,
            respond_timeout: config.respond_timeout,
        }
    }
}

pub struct AiAssistant {
    pipeline: MixtureOfAgents,
    gateway: Arc<CallGateway>,
    settings: AssistantSettings,
}

impl AiAssistant {
    pub fn new(pipeline: MixtureOfAgents, gateway: Arc<CallGateway>, settings: AssistantSettings) -> Self {
        Self {
            pipeline,
            gateway,
            settings: AssistantSettings {
                chunk_concurrency: settings.chunk_concurrency.max(1),
                chunk_tokens: settings.chunk_tokens.max(1),
                ..settings
            },
        }
    }

    /// Build the pipeline described by `config` over `gateway`
    pub fn from_config(config: &Config, gateway: Arc<CallGateway>) -> anyhow::Result<Self> {
        let pipeline = MixtureOfAgents::new(&config.topology, Arc::clone(&gateway), config.agent_concurrency)?;
        Ok(Self::new(pipeline, gateway, AssistantSettings::from(config)))
    }

    /// Same as `from_config` with an explicit topology
    pub fn with_topology(
        topology: &Topology,
        gateway: Arc<CallGateway>,
        agent_concurrency: usize,
        settings: AssistantSettings,
    ) -> anyhow::Result<Self> {
        let pipeline = MixtureOfAgents::new(topology, Arc::clone(&gateway), agent_concurrency)?;
        Ok(Self::new(pipeline, gateway, settings))
    }

    pub fn history(&self) -> Vec<ConversationMessage> {
        self.pipeline.history()
    }

    /// Answer `input`, returning the text and the conversation so far
    ///
    /// Past the deadline the unfinished pipeline runs are abandoned: calls
    /// already issued still complete in the gateway, no partial exchange is
    /// recorded, and the reply degrades to `DEADLINE_REPLY`.
    pub async fn respond(&self, input: &str, concise: bool) -> (String, Vec<ConversationMessage>) {
        let tone = ResponseTone::from_concise(concise);

        match tokio::time::timeout(self.settings.respond_timeout, self.run(input, tone)).await {
            Ok(text) => (text, self.history()),
            Err(_) => {
                warn!(
                    "respond exceeded {:?}; answering without unfinished work",
                    self.settings.respond_timeout
                );
                (DEADLINE_REPLY.to_string(), self.history())
            }
        }
    }

    async fn run(&self, input: &str, tone: ResponseTone) -> String {
        let input_chunks = chunk_text(input, self.settings.chunk_tokens);
        info!("Responding to {} input chunk(s), tone {}", input_chunks.len(), tone.as_str());

        let pipeline_outputs: Vec<String> = stream::iter(input_chunks.iter().map(|chunk| async move {
            self.pipeline.process(chunk).await.synthesis
        }))
        .buffered(self.settings.chunk_concurrency)
        .collect()
        .await;
        let combined = pipeline_outputs.join(" ");

        let output_chunks = chunk_text(&combined, self.settings.chunk_tokens);
        debug!("Final synthesis over {} chunk(s)", output_chunks.len());

        let responses: Vec<String> = stream::iter(
            output_chunks
                .iter()
                .map(|chunk| self.synthesize_final(input, chunk, tone)),
        )
        .buffered(self.settings.chunk_concurrency)
        .collect()
        .await;

        responses.join(" ")
    }

    async fn synthesize_final(&self, input: &str, pipeline_output: &str, tone: ResponseTone) -> String {
        let system = final_system_prompt(tone);
        let prompt = format!(
            "Original user input: {input}\n\n\
             Mixture of Agents output (including Tree of Thought processes):\n{output}\n\n\
             Based on this input, provide a {tone} response to the original user input. \
             Be sure to incorporate all relevant information and insights:",
            input = input,
            output = pipeline_output,
            tone = tone.as_str(),
        );

        match self
            .gateway
            .call_prompt(&system, &prompt, self.settings.max_tokens)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!("Error in synthesizing final response: {}", e);
                CHUNK_APOLOGY.to_string()
            }
        }
    }
}

fn final_system_prompt(tone: ResponseTone) -> String {
    format!(
        "You are an AI assistant with access to a large context window. Your task is to \
         synthesize the output from a Mixture of Agents (which includes Tree of Thought processes) \
         into a single, {} response. Provide a clear, coherent, and complete answer to the \
         original user input, directly addressing the question and incorporating all relevant \
         information from the provided input.",
        tone.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::error::ServiceError;
    use crate::gateway::GatewayConfig;
    use crate::recovery::RetryPolicy;
    use crate::testing::{ScriptedCompletion, ScriptedSearch};

    const FINAL_MARKER: &str = "large context window";

    fn assistant(completion: Arc<ScriptedCompletion>, settings: AssistantSettings) -> AiAssistant {
        let gateway = Arc::new(CallGateway::new(
            completion,
            Arc::new(ScriptedSearch::always("[]")),
            GatewayConfig {
                retry: RetryPolicy::immediate(1),
                ..GatewayConfig::default()
            },
        ));
        AiAssistant::with_topology(&Topology::uniform(1, 1, 0, 1), gateway, 1, settings).unwrap()
    }

    #[test]
    fn test_tone() {
        assert_eq!(ResponseTone::from_concise(true), ResponseTone::Concise);
        assert_eq!(ResponseTone::from_concise(false).as_str(), "comprehensive");
        assert!(final_system_prompt(ResponseTone::Concise).contains("single, concise response"));
    }

    #[tokio::test]
    async fn test_final_chunk_failure_apologizes() {
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            if req.system.contains(FINAL_MARKER) {
                Err(ServiceError::Auth("401".into()))
            } else {
                Ok("pipeline text".to_string())
            }
        }));
        let assistant = assistant(completion, AssistantSettings::default());

        let (text, history) = assistant.respond("Why is the sky blue?", false).await;
        assert_eq!(text, CHUNK_APOLOGY);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let completion = Arc::new(ScriptedCompletion::always("x"));
        let assistant = assistant(completion.clone(), AssistantSettings::default());

        let (text, history) = assistant.respond("", true).await;
        assert!(text.is_empty());
        assert!(history.is_empty());
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_and_keeps_history_clean() {
        let completion = Arc::new(ScriptedCompletion::always("ok").with_latency_by(|req| {
            if req.prompt().contains("first question") {
                Duration::from_secs(20)
            } else {
                Duration::ZERO
            }
        }));
        let assistant = assistant(
            completion.clone(),
            AssistantSettings {
                respond_timeout: Duration::from_secs(5),
                ..AssistantSettings::default()
            },
        );

        let (text, history) = assistant.respond("first question", false).await;
        assert_eq!(text, DEADLINE_REPLY);
        assert!(history.is_empty());

        let (text, history) = assistant.respond("second question", false).await;
        assert_eq!(text, "ok");
        assert_eq!(history, vec![
            ConversationMessage::user("second question"),
            ConversationMessage::assistant("ok"),
        ]);

        let second_turn_agent = completion.requests_matching("You are agent").pop().unwrap();
        assert!(!second_turn_agent.prompt().contains("first question"));

        // The slow call issued before the deadline still ran to the end
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(completion.finished_count(), completion.call_count());
    }

    #[tokio::test]
    async fn test_chunks_run_in_order() {
        let completion = Arc::new(ScriptedCompletion::always("ok"));
        let assistant = assistant(
            completion.clone(),
            AssistantSettings {
                chunk_tokens: 3,
                ..AssistantSettings::default()
            },
        );

        let (text, history) = assistant.respond("First point here. Second point here.", true).await;
        let users: Vec<_> = history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["First point here. ", "Second point here."]);

        // "ok ok" fits one output chunk, so one final call
        assert_eq!(text, "ok");
        assert_eq!(completion.requests_matching(FINAL_MARKER).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_chunks_assemble_by_position() {
        // The first chunk's agent answers last
        let completion = Arc::new(
            ScriptedCompletion::new(|req| {
                let prompt = req.prompt();
                if req.system.contains("You are agent") {
                    Ok(if prompt.contains("Alpha") { "alpha." } else { "beta." }.to_string())
                } else if req.system.contains("synthesizing the outputs") {
                    Ok(if prompt.contains("alpha.") { "alpha." } else { "beta." }.to_string())
                } else if req.system.contains(FINAL_MARKER) {
                    Ok(prompt
                        .split("Tree of Thought processes):\n")
                        .nth(1)
                        .and_then(|rest| rest.split("\n\n").next())
                        .unwrap_or("")
                        .to_string())
                } else {
                    Ok("thought synthesis".to_string())
                }
            })
            .with_latency_by(|req| {
                if req.system.contains("You are agent") && req.prompt().contains("Alpha") {
                    Duration::from_secs(10)
                } else {
                    Duration::ZERO
                }
            }),
        );
        let assistant = assistant(
            completion,
            AssistantSettings {
                chunk_tokens: 5,
                chunk_concurrency: 2,
                ..AssistantSettings::default()
            },
        );

        let (text, history) = assistant.respond("Alpha one here. Beta two here.", true).await;
        assert_eq!(text, "alpha. beta.");

        // Second chunk finished first; every exchange is intact and paired
        assert_eq!(history, vec![
            ConversationMessage::user("Beta two here."),
            ConversationMessage::assistant("beta."),
            ConversationMessage::user("Alpha one here. "),
            ConversationMessage::assistant("alpha."),
        ]);
    }
}
