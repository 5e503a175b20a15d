//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod next_dir;
mod run;

pub use next_dir::NextDirArgs;
pub use run::RunArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a batch of jobs
    Run(RunArgs),
    /// Suggest the next numbered run directory for a job
    NextDir(NextDirArgs),
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
///
/// # Returns
/// The process exit status
pub async fn handle_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run(args) => run::handle_run(args).await,
        Commands::NextDir(args) => next_dir::handle_next_dir(args),
    }
}
