//! Follow-up Search Protocol
//!
//! A model reply may ask for more context by starting a line with
//! `SEARCH:` followed by a query. The reply is parsed into a tagged
//! `Reply` instead of being substring-matched, so the marker quoted
//! mid-sentence doesn't trigger a search.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gateway::CallGateway;

/// Literal marker the model is told to emit
pub const SEARCH_MARKER: &str = "SEARCH:";

/// Follow-up search rounds allowed per reply chain
pub const MAX_SEARCH_ROUNDS: usize = 1;

static SEARCH_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*SEARCH:[ \t]*(?P<query>.*?)\s*$").expect("search line regex"));

/// Parsed model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Usable as-is
    Final(String),
    /// Model asked for another search before answering
    NeedsSearch { response: String, query: String },
}

impl Reply {
    pub fn parse(response: &str) -> Self {
        let query = SEARCH_LINE
            .captures_iter(response)
            .filter_map(|c| c.name("query").map(|q| q.as_str().trim().to_string()))
            .find(|q| !q.is_empty());

        match query {
            Some(query) => Self::NeedsSearch {
                response: response.to_string(),
                query,
            },
            None => {
                if response.contains(SEARCH_MARKER) {
                    debug!("Search marker present but not line-anchored or empty; treating reply as final");
                }
                Self::Final(response.to_string())
            }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Final(text) => text,
            Self::NeedsSearch { response, .. } => response,
        }
    }
}

/// Resolve a reply, running at most `MAX_SEARCH_ROUNDS` search-and-ask rounds
///
/// `search` performs the follow-up search; its failure is folded into the
/// follow-up prompt rather than aborting. A completion failure propagates.
pub async fn resolve<F, Fut>(
    gateway: &CallGateway,
    system: &str,
    first: String,
    max_tokens: usize,
    closing: &str,
    search: F,
) -> Result<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut reply = Reply::parse(&first);
    let mut rounds = 0;

    while rounds < MAX_SEARCH_ROUNDS {
        let (response, query) = match reply {
            Reply::Final(text) => return Ok(text),
            Reply::NeedsSearch { response, query } => (response, query),
        };
        rounds += 1;
        debug!("Follow-up search round {}: {}", rounds, query);

        let follow_up = match search(query).await {
            Ok(info) => format!(
                "{}\n\nAdditional Internet Information:\n{}\n\nNow, provide your final {}:",
                response, info, closing
            ),
            Err(e) => {
                warn!("Error during additional internet search: {}", e);
                format!(
                    "{}\n\nAdditional search unavailable. Please provide your {} based on the available information:",
                    response, closing
                )
            }
        };

        let next = gateway.call_prompt(system, &follow_up, max_tokens).await?;
        reply = if rounds < MAX_SEARCH_ROUNDS {
            Reply::parse(&next)
        } else {
            Reply::Final(next)
        };
    }

    Ok(reply.text().to_string())
}
