//! Next-dir command
//!
//! Suggests the next `<job>_est_<n>` directory next to a job file.

use anyhow::{Context, Result};
use batchfit_core::domain::next_run::{NextRunSuggestion, find_next_est_dir_num};
use batchfit_core::fs::{FileSystem, OsFileSystem};
use clap::Args;
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Arguments of `batchfit next-dir`
#[derive(Args, Debug)]
pub struct NextDirArgs {
    /// Job file the run directories belong to
    job_file: PathBuf,

    /// Zero-pad width of the run number
    #[arg(long, default_value_t = 2)]
    padding: usize,

    /// Print the suggestion as JSON
    #[arg(long)]
    json: bool,
}

/// Handle `batchfit next-dir`
pub fn handle_next_dir(args: NextDirArgs) -> Result<ExitCode> {
    let suggestion = suggest(&OsFileSystem, &args.job_file, args.padding)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&suggestion).context("Failed to serialize suggestion")?
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", suggestion.suggested_name.bold());
    if suggestion.is_first_run {
        println!("  {}", "First run for this job".dimmed());
    }
    if suggestion.needs_renumbering {
        println!(
            "  {}",
            "Existing run directories have gaps and could be renumbered".yellow()
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Suggestion for `job_file` from the directories beside it
fn suggest(fs: &dyn FileSystem, job_file: &Path, padding: usize) -> Result<NextRunSuggestion> {
    let dir = match job_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let dir_names: Vec<String> = fs
        .list(&dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .into_iter()
        .filter(|name| fs.is_dir(&dir.join(name)))
        .collect();

    let stem = job_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(find_next_est_dir_num(&stem, &dir_names, padding))
}
