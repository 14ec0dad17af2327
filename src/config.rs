//! Configuration management

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agent::AgentIdentity;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic API key (optional at load; completions fail with an auth error without it)
    pub anthropic_api_key: Option<String>,

    /// Tavily API key (optional at load)
    pub tavily_api_key: Option<String>,

    /// Completion model id
    pub model: String,

    /// Token budget for the final response calls
    pub max_tokens: usize,

    /// Chunk size, in estimated tokens
    pub chunk_tokens: usize,

    /// Deadline for one whole `respond` call
    pub respond_timeout: Duration,

    /// Agents in flight per layer
    pub agent_concurrency: usize,

    /// Chunks in flight per request
    pub chunk_concurrency: usize,

    /// Layer and agent layout
    pub topology: Topology,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty());
        let tavily_api_key = lookup("TAVILY_API_KEY").filter(|k| !k.is_empty());

        let model = lookup("MOA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = parse_or(&lookup, "MOA_MAX_TOKENS", 4096)?;
        let chunk_tokens = parse_or(&lookup, "MOA_CHUNK_TOKENS", 4096)?;
        let respond_timeout = Duration::from_secs(parse_or(&lookup, "MOA_RESPOND_TIMEOUT_SECS", 180)?);
        let agent_concurrency = parse_or(&lookup, "MOA_AGENT_CONCURRENCY", 4)?;
        let chunk_concurrency = parse_or(&lookup, "MOA_CHUNK_CONCURRENCY", 1)?;

        let topology = match lookup("MOA_TOPOLOGY_FILE") {
            Some(path) => Topology::from_file(&PathBuf::from(path))?,
            None => Topology::uniform(
                parse_or(&lookup, "MOA_LAYERS", 2)?,
                parse_or(&lookup, "MOA_AGENTS_PER_LAYER", 2)?,
                parse_or(&lookup, "MOA_TOT_DEPTH", 2)?,
                parse_or(&lookup, "MOA_TOT_BRANCHING", 2)?,
            ),
        };
        topology.validate()?;

        if chunk_tokens == 0 {
            bail!("MOA_CHUNK_TOKENS must be positive");
        }

        Ok(Self {
            anthropic_api_key,
            tavily_api_key,
            model,
            max_tokens,
            chunk_tokens,
            respond_timeout,
            agent_concurrency: agent_concurrency.max(1),
            chunk_concurrency: chunk_concurrency.max(1),
            topology,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

/// Layer layout, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topology {
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LayerSpec {
    pub agents: Vec<AgentIdentity>,
}

impl Topology {
    /// `layers` x `per_layer` agents named `L{i}A{j}`, all sharing one search shape
    pub fn uniform(layers: usize, per_layer: usize, depth: usize, branching: usize) -> Self {
        Self {
            layers: (0..layers)
                .map(|i| LayerSpec {
                    agents: (0..per_layer)
                        .map(|j| AgentIdentity::new(&format!("L{}A{}", i, j), depth, branching))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Parse a TOML topology file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid topology file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let topology: Self = toml::from_str(raw)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Every layer needs at least one agent, and there must be a layer
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            bail!("topology has no layers");
        }
        if let Some(index) = self.layers.iter().position(|l| l.agents.is_empty()) {
            bail!("layer {} has no agents", index);
        }
        Ok(())
    }

    pub fn agent_count(&self) -> usize {
        self.layers.iter().map(|l| l.agents.len()).sum()
    }
}
