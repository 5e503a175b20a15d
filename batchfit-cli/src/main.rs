//! batchfit
//!
//! Runs batches of compute jobs on this machine or submits them to a grid
//! engine.
//!
//! Exit status:
//! - 0 when every job completed
//! - 1 on a fatal error (no job was executed)
//! - 2 when at least one job failed

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "batchfit_cli=info,batchfit_runner=info";
const DEBUG_FILTER: &str = "batchfit_cli=debug,batchfit_runner=debug";

#[derive(Parser)]
#[command(name = "batchfit")]
#[command(about = "Batch orchestrator for external compute jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(long, global = true, env = "BATCHFIT_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(DEBUG_FILTER)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_FILTER.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    handle_command(cli.command).await
}
