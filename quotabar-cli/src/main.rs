//! Diagnostic CLI for the QuotaBar fetch pipeline.
//!
//! The status-bar app is a separate consumer; this binary exists to
//! exercise the orchestrator end-to-end from a terminal:
//!
//! ```text
//! quotabar usage claude --source oauth
//! quotabar providers --json
//! ```

mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quotabar", version, about = "Usage quota fetcher for AI coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a usage snapshot for one provider.
    Usage {
        /// Provider name (codex, claude, copilot, augment, minimax, jetbrains).
        provider: String,
        /// Restrict strategies to one source kind.
        #[arg(long, default_value = "auto")]
        source: String,
        /// Network timeout in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Manually pasted cookie header for web strategies.
        #[arg(long)]
        cookie_header: Option<String>,
        /// Manually configured API token.
        #[arg(long)]
        token: Option<String>,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List providers and the strategies each would try.
    Providers {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Usage {
            provider,
            source,
            timeout,
            cookie_header,
            token,
            json,
        } => {
            commands::usage::run(commands::usage::UsageArgs {
                provider,
                source,
                timeout,
                cookie_header,
                token,
                json,
            })
            .await
        }
        Commands::Providers { json } => commands::providers::run(json),
    }
}
