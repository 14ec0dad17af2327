//! Thoughts - candidate reasoning steps with a feasibility evaluation

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `Thought <n>: <content> - Evaluation: <evaluation>`
static THOUGHT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\W*thought[^:]*:\**\s*(?P<content>.*?)\s*-\s*evaluation:\s*(?P<evaluation>.*?)\s*$")
        .expect("thought line regex")
});

/// Feasibility verdict attached to a thought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluation {
    Sure,
    Maybe,
    Impossible,
    /// Root input, or a verdict the model phrased some other way
    Unset,
}

impl Evaluation {
    /// Lenient parse: tolerates brackets, punctuation and case
    pub fn parse(raw: &str) -> Self {
        let word: String = raw
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "sure" => Self::Sure,
            "maybe" => Self::Maybe,
            "impossible" => Self::Impossible,
            _ => Self::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sure => "sure",
            Self::Maybe => "maybe",
            Self::Impossible => "impossible",
            Self::Unset => "unset",
        }
    }
}

/// A candidate reasoning step; never mutated after construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thought {
    content: String,
    evaluation: Evaluation,
}

impl Thought {
    /// The unevaluated root of a search
    pub fn root(content: &str) -> Self {
        Self {
            content: content.to_string(),
            evaluation: Evaluation::Unset,
        }
    }

    pub fn evaluated(content: &str, evaluation: Evaluation) -> Self {
        Self {
            content: content.to_string(),
            evaluation,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn evaluation(&self) -> Evaluation {
        self.evaluation
    }

    /// Parse one model output line; `None` unless both markers are present
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = THOUGHT_LINE.captures(line)?;
        let content = caps.name("content")?.as_str().trim();
        let evaluation = Evaluation::parse(caps.name("evaluation")?.as_str());
        Some(Self::evaluated(content, evaluation))
    }

    /// Parse every well-formed line of a response, keeping at most `limit`
    pub fn parse_response(response: &str, limit: usize) -> Vec<Self> {
        response
            .lines()
            .filter_map(Self::parse_line)
            .take(limit)
            .collect()
    }
}

impl fmt::Display for Thought {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thought: {} - Evaluation: {}", self.content, self.evaluation.as_str())
    }
}
