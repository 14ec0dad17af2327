//! Tree of Thought Search
//!
//! Bounded breadth-first exploration of reasoning continuations:
//! 1. Seed a FIFO frontier with the input at depth 0
//! 2. Pop; resolve if at max depth or evaluated `sure`
//! 3. Otherwise ask the model for `branching_factor` evaluated children
//! 4. Enqueue every child not evaluated `impossible` at depth + 1
//! 5. Stop once `branching_factor` thoughts are resolved or the frontier drains
//!
//! Depth strictly increases along every chain and is capped, so the loop
//! always terminates.

use std::collections::VecDeque;
use tracing::{debug, error, warn};

use crate::error::{OrchestrationError, Result};
use crate::gateway::CallGateway;
use crate::thought::{Evaluation, Thought};

/// Returned when the synthesis call fails
pub const SYNTHESIS_FALLBACK: &str = "Unable to synthesize thoughts due to an error.";

const SYNTHESIS_MAX_TOKENS: usize = 500;
const EXPANSION_MAX_TOKENS: usize = 1024;

/// Output of one search invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtOutcome {
    /// Resolved thoughts in resolution order
    pub thoughts: Vec<Thought>,
    pub synthesis: String,
}

/// Per-agent bounded search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThoughtSearch {
    max_depth: usize,
    branching_factor: usize,
}

impl ThoughtSearch {
    pub fn new(max_depth: usize, branching_factor: usize) -> Self {
        Self {
            max_depth,
            branching_factor: branching_factor.max(1),
        }
    }

    /// Search, then synthesize the resolved thoughts
    pub async fn process(&self, gateway: &CallGateway, input: &str) -> ThoughtOutcome {
        let thoughts = self.search(gateway, input).await;
        let synthesis = self.synthesize(gateway, &thoughts).await;
        ThoughtOutcome {
            thoughts,
            synthesis,
        }
    }

    /// Run the frontier loop; an expansion failure ends the search early
    pub async fn search(&self, gateway: &CallGateway, input: &str) -> Vec<Thought> {
        let mut frontier: VecDeque<(Thought, usize)> = VecDeque::new();
        frontier.push_back((Thought::root(input), 0));
        let mut solution = Vec::new();

        while solution.len() < self.branching_factor {
            let Some((thought, depth)) = frontier.pop_front() else {
                break;
            };

            if depth >= self.max_depth || thought.evaluation() == Evaluation::Sure {
                debug!("Resolved thought at depth {}: {}", depth, thought.content());
                solution.push(thought);
                continue;
            }

            match self.expand(gateway, thought.content(), depth + 1).await {
                Ok(children) => {
                    frontier.extend(
                        children
                            .into_iter()
                            .filter(|c| c.evaluation() != Evaluation::Impossible)
                            .map(|c| (c, depth + 1)),
                    );
                }
                // Unparseable expansion: nothing to enqueue, keep draining
                Err(OrchestrationError::MalformedResponse(reason)) => {
                    warn!("Expansion at depth {}: {}", depth + 1, reason);
                }
                Err(e) => {
                    error!("Error generating and evaluating thoughts: {}", e);
                    break;
                }
            }
        }

        solution
    }

    /// One gateway call producing up to `branching_factor` evaluated children
    async fn expand(&self, gateway: &CallGateway, prompt: &str, depth: usize) -> Result<Vec<Thought>> {
        let system = expansion_system_prompt(self.branching_factor);
        let user = format!(
            "Depth: {}\nPrompt: {}\n\nGenerate and evaluate {} thoughts:",
            depth, prompt, self.branching_factor
        );

        let response = gateway.call_prompt(&system, &user, EXPANSION_MAX_TOKENS).await?;
        let children = Thought::parse_response(&response, self.branching_factor);
        if children.is_empty() {
            return Err(OrchestrationError::MalformedResponse(
                "no parseable thoughts in expansion".to_string(),
            ));
        }
        Ok(children)
    }

    /// Condense resolved thoughts into a short string
    pub async fn synthesize(&self, gateway: &CallGateway, thoughts: &[Thought]) -> String {
        let user = if thoughts.is_empty() {
            "No thoughts were resolved.".to_string()
        } else {
            thoughts
                .iter()
                .enumerate()
                .map(|(i, t)| format!("Thought {}: {}", i + 1, t.content()))
                .collect::<Vec<_>>()
                .join("\n")
        };

        match gateway
            .call_prompt(SYNTHESIS_SYSTEM_PROMPT, &user, SYNTHESIS_MAX_TOKENS)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!("Error synthesizing thoughts: {}", e);
                SYNTHESIS_FALLBACK.to_string()
            }
        }
    }
}

impl Default for ThoughtSearch {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

const SYNTHESIS_SYSTEM_PROMPT: &str =
    "Synthesize the following thoughts into a brief, coherent response.";

fn expansion_system_prompt(branching_factor: usize) -> String {
    format!(
        "Propose and evaluate {n} candidate thoughts as next reasoning steps for the given prompt.\n\
         Evaluate each thought as exactly one of 'sure', 'maybe', or 'impossible'.\n\
         Answer with one line per thought in this exact format:\n\
         Thought 1: <content> - Evaluation: <evaluation>\n\
         Thought 2: <content> - Evaluation: <evaluation>\n\
         Finish with a line 'Synthesis: <one sentence addressing the prompt>'.",
        n = branching_factor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::gateway::GatewayConfig;
    use crate::recovery::RetryPolicy;
    use crate::testing::{ScriptedCompletion, ScriptedSearch};
    use std::sync::Arc;

    fn gateway(completion: Arc<ScriptedCompletion>) -> CallGateway {
        CallGateway::new(
            completion,
            Arc::new(ScriptedSearch::always("{}")),
            GatewayConfig {
                retry: RetryPolicy::immediate(1),
                ..GatewayConfig::default()
            },
        )
    }

    fn is_expansion(req: &crate::services::CompletionRequest) -> bool {
        req.system.contains("candidate thoughts")
    }

    #[tokio::test]
    async fn test_depth_zero_resolves_root() {
        let completion = Arc::new(ScriptedCompletion::always("summary"));
        let gw = gateway(completion.clone());

        let outcome = ThoughtSearch::new(0, 3).process(&gw, "root input").await;
        assert_eq!(outcome.thoughts, vec![Thought::root("root input")]);
        assert_eq!(outcome.synthesis, "summary");
        // Only the synthesis call
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sure_child_resolves_without_expansion() {
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            if is_expansion(req) {
                Ok("Thought 1: Count 1, 2, 3, 4, 5 - Evaluation: sure".to_string())
            } else {
                Ok("1 2 3 4 5".to_string())
            }
        }));
        let gw = gateway(completion.clone());

        let outcome = ThoughtSearch::new(3, 1).process(&gw, "Count from 1 to 5.").await;
        assert_eq!(outcome.thoughts.len(), 1);
        assert_eq!(outcome.thoughts[0].content(), "Count 1, 2, 3, 4, 5");
        // Root expansion only; the sure child at depth 1 < 3 is not expanded
        assert_eq!(completion.requests().iter().filter(|r| is_expansion(r)).count(), 1);
    }

    #[tokio::test]
    async fn test_impossible_children_never_enter_frontier() {
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            if is_expansion(req) {
                Ok("Thought 1: dead end - Evaluation: impossible\n\
                    Thought 2: viable - Evaluation: maybe"
                    .to_string())
            } else {
                Ok("done".to_string())
            }
        }));
        let gw = gateway(completion.clone());

        let thoughts = ThoughtSearch::new(1, 2).search(&gw, "q").await;
        assert_eq!(thoughts.len(), 1);
        assert_eq!(thoughts[0].content(), "viable");
        assert!(thoughts.iter().all(|t| t.content() != "dead end"));
    }

    #[tokio::test]
    async fn test_result_bounded_by_branching_factor() {
        for depth in 0..4 {
            for branching in 1..4 {
                let completion = Arc::new(ScriptedCompletion::always(
                    "Thought 1: a - Evaluation: maybe\n\
                     Thought 2: b - Evaluation: maybe\n\
                     Thought 3: c - Evaluation: maybe\n\
                     Thought 4: d - Evaluation: maybe",
                ));
                let gw = gateway(completion);
                let thoughts = ThoughtSearch::new(depth, branching).search(&gw, "q").await;
                assert!(thoughts.len() <= branching);
                assert!(!thoughts.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_unparseable_expansion_is_no_action() {
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            if is_expansion(req) {
                Ok("I would rather not enumerate thoughts.".to_string())
            } else {
                Ok("nothing to add".to_string())
            }
        }));
        let gw = gateway(completion.clone());

        let outcome = ThoughtSearch::new(2, 2).process(&gw, "q").await;
        assert!(outcome.thoughts.is_empty());
        assert_eq!(outcome.synthesis, "nothing to add");
        assert_eq!(completion.call_count(), 2);
    }

    #[tokio::test]
    async fn test_expansion_failure_returns_partial() {
        let completion = Arc::new(ScriptedCompletion::failing(ServiceError::Auth("401".into())));
        let gw = gateway(completion);

        let outcome = ThoughtSearch::new(2, 2).process(&gw, "q").await;
        assert!(outcome.thoughts.is_empty());
        assert_eq!(outcome.synthesis, SYNTHESIS_FALLBACK);
    }

    #[tokio::test]
    async fn test_synthesis_is_stable_for_same_input() {
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            Ok(format!("synthesis of [{}]", req.prompt()))
        }));
        let gw = gateway(completion);
        let search = ThoughtSearch::default();
        let thoughts = vec![Thought::evaluated("Paris", Evaluation::Sure)];

        let first = search.synthesize(&gw, &thoughts).await;
        let second = search.synthesize(&gw, &thoughts).await;
        assert_eq!(first, second);
        assert!(first.contains("Thought 1: Paris"));
    }
}
