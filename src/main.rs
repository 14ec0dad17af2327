//! Claude MoA - Entry Point
//!
//! Modes:
//! - With a query: answer it once and exit
//! - Without: read questions from stdin, one per line, keeping the conversation

use claude_moa::{AiAssistant, CallGateway, ClaudeClient, Config, GatewayConfig, TavilyClient, TokenCounter};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let concise = args.iter().any(|a| a == "--concise" || a == "-c");
    let json_logs = args.iter().any(|a| a == "--json");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let query = args
        .iter()
        .filter(|a| !a.starts_with('-'))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    if help_mode {
        println!("Claude MoA v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: claude-moa [OPTIONS] [QUERY...]");
        println!();
        println!("Options:");
        println!("  --concise, -c      Ask for a concise answer");
        println!("  --json             Log to stderr as JSON");
        println!("  --help, -h         Show this help");
        println!();
        println!("Without a query, reads one question per line from stdin.");
        println!();
        println!("Environment variables:");
        println!("  ANTHROPIC_API_KEY         Claude API key");
        println!("  TAVILY_API_KEY            Tavily search API key");
        println!("  MOA_MODEL                 Completion model");
        println!("  MOA_LAYERS                Layers (default: 2)");
        println!("  MOA_AGENTS_PER_LAYER      Agents per layer (default: 2)");
        println!("  MOA_TOT_DEPTH             Thought search depth (default: 2)");
        println!("  MOA_TOT_BRANCHING         Thought search branching (default: 2)");
        println!("  MOA_TOPOLOGY_FILE         TOML file describing layers explicitly");
        println!("  MOA_RESPOND_TIMEOUT_SECS  Deadline per answer (default: 180)");
        return Ok(());
    }

    // Setup logging; RUST_LOG takes full directives, e.g. "claude_moa=debug"
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // stdout carries answers; logs go to stderr
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Claude MoA v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let claude = ClaudeClient::from_config(&config);
    if !claude.is_available() {
        anyhow::bail!("ANTHROPIC_API_KEY is not set. Check your .env file.");
    }

    let tavily = TavilyClient::from_config(&config);
    if !tavily.verify().await {
        anyhow::bail!("Failed to verify Tavily API key. Check your .env file and try again.");
    }

    let gateway = Arc::new(CallGateway::new(
        Arc::new(claude),
        Arc::new(tavily),
        GatewayConfig::default(),
    ));
    let assistant = AiAssistant::from_config(&config, Arc::clone(&gateway))?;
    info!(
        "Topology: {} layers, {} agents, model {}",
        config.topology.layers.len(),
        config.topology.agent_count(),
        config.model
    );

    if !query.is_empty() {
        let (response, _) = assistant.respond(&query, concise).await;
        println!("{}", response);
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (response, history) = assistant.respond(line, concise).await;
            println!("{}\n", response);
            info!(
                "Turn complete: ~{} tokens, {} messages in history",
                TokenCounter::format_tokens(TokenCounter::new().count(&response)),
                history.len()
            );
        }
    }

    let stats = gateway.stats();
    if stats.failures > 0 {
        error!("{} gateway calls failed", stats.failures);
    }
    info!(
        "Gateway: {} completions, {} searches, {} retries",
        stats.completions, stats.searches, stats.retries
    );

    Ok(())
}
