use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use wakegate::{
    Batch, ConfigHandle, ConversationKey, MessageEvent, Verdict, VerdictSink, WakeConfig,
    WakeEngine,
};

/// Wakegate - wake decision engine for group-chat bots
#[derive(Parser)]
#[command(name = "wakegate", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "WAKEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Path for the crash-recovery state snapshot
    #[arg(long, env = "WAKEGATE_STATE")]
    state: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a configuration file and exit
    Check {
        /// Path to the YAML configuration file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,wakegate=info",
        1 => "info,wakegate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Sink that prints one JSON verdict line per flushed batch
struct PrintSink;

#[async_trait]
impl VerdictSink for PrintSink {
    async fn on_verdict(&self, batch: &Batch, verdict: &Verdict) {
        let line = serde_json::json!({
            "conversation": batch.user.conversation.as_str(),
            "sender": batch.user.sender,
            "text": batch.merged_text(),
            "verdict": verdict,
        });
        println!("{line}");
    }

    async fn on_idle_wake(&self, conversation: &ConversationKey) {
        let line = serde_json::json!({
            "conversation": conversation.as_str(),
            "verdict": { "verdict": "idle_wake" },
        });
        println!("{line}");
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Check { config }) = cli.command {
        let loaded = WakeConfig::from_yaml_file(&config)?;
        loaded.validate()?;
        println!("{} is valid", config.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => WakeConfig::from_yaml_file(path)?,
        None => WakeConfig::default(),
    };

    let engine = Arc::new(WakeEngine::new(
        ConfigHandle::new(config)?,
        Arc::new(PrintSink),
    ));

    if let Some(state) = &cli.state {
        if state.exists() {
            engine.load_state(state).await?;
        }
    }

    let sweeper = engine.spawn_sweeper();
    tracing::info!("wakegate ready, reading conversation|sender|text lines from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Some(event) => engine.handle_event(event).await,
                    None => tracing::warn!(line, "skipping malformed input line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    engine.shutdown().await;
    sweeper.await?;

    if let Some(state) = &cli.state {
        engine.save_state(state).await?;
    }

    Ok(())
}

/// Parse `conversation|sender|text` with optional `|bot` / `|admin` flags
fn parse_line(line: &str) -> Option<MessageEvent> {
    let mut parts = line.splitn(4, '|');
    let conversation = parts.next()?.trim();
    let sender = parts.next()?.trim();
    let text = parts.next()?;
    if conversation.is_empty() || sender.is_empty() {
        return None;
    }

    let mut event = MessageEvent::new(conversation, sender, text);
    match parts.next().map(str::trim) {
        Some("bot") => event = event.from_bot(),
        Some("admin") => event = event.from_admin(),
        _ => {}
    }
    Some(event)
}
