//! GuessWho CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "guesswho")]
#[command(version, about = "GuessWho infrastructure synthesis", long_about = None)]
struct Cli {
    /// Configuration file (KDL). Falls back to environment variables when absent.
    #[arg(long, short, global = true, env = "GUESSWHO_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the assembly and print its manifest
    Synth {
        /// Write the manifest to a file instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Check the configuration and synthesize without output
    Validate,
    /// Show what a provisioner would be asked to do
    Plan,
    /// Simulate a pipeline run
    Run {
        /// Approve manual approval gates
        #[arg(long, conflicts_with = "reject")]
        approve: bool,
        /// Reject manual approval gates
        #[arg(long)]
        reject: bool,
        /// Reason recorded with a rejection
        #[arg(long, requires = "reject")]
        reason: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Variables already set in the process environment take precedence.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json);
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Synth { out } => {
            commands::synth::run(config, out.as_deref())?;
        }
        Commands::Validate => {
            commands::validate(config)?;
        }
        Commands::Plan => {
            commands::plan::run(config).await?;
        }
        Commands::Run {
            approve,
            reject,
            reason,
        } => {
            let gate = commands::run::GateChoice::from_flags(approve, reject, reason);
            commands::run::run(config, gate).await?;
        }
    }

    Ok(())
}
