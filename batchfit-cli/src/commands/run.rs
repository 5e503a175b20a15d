//! Run command
//!
//! Resolves the job arguments, builds descriptors, runs the batch against
//! the chosen target and prints the summary.

use anyhow::{Context, Result};
use batchfit_core::domain::batch::BatchResult;
use batchfit_core::fs::{FileSystem, OsFileSystem};
use batchfit_runner::resolver::resolve_arguments;
use batchfit_runner::{
    ConfigOverrides, DescriptorBuilder, ExecutionService, GridExecutionService, JobManager,
    LocalExecutionService,
};
use clap::{Args, ValueEnum};
use colored::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Worker pool bound used when no job carries a configuration
const DEFAULT_THREADS: usize = 4;

/// Exit status when at least one job failed
const JOB_FAILURE_EXIT: u8 = 2;

/// Where jobs run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// On this machine, waiting for each job
    Local,
    /// Submitted to a Sun Grid Engine cluster
    Sge,
}

/// Arguments of `batchfit run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Execution target
    #[arg(value_enum)]
    target: Target,

    /// Job files, directories or ranges such as run[001:010].mod
    #[arg(required = true)]
    args: Vec<String>,

    /// Version tag of the compute binary to use
    #[arg(long)]
    nm_version: Option<String>,

    /// Run each job across several nodes
    #[arg(long, overrides_with = "no_parallel")]
    parallel: bool,

    /// Run each job on a single node
    #[arg(long, overrides_with = "parallel")]
    no_parallel: bool,

    /// Total node count for parallel runs
    #[arg(long)]
    nodes: Option<u32>,

    /// Seconds parallel workers are given to complete
    #[arg(long)]
    timeout: Option<u64>,

    /// MPI launcher for parallel runs
    #[arg(long)]
    mpi_exec_path: Option<String>,

    /// Parallel configuration file to use verbatim
    #[arg(long)]
    parafile: Option<PathBuf>,

    /// Scratch file cleanup level
    #[arg(long)]
    clean_lvl: Option<u32>,

    /// Result copy-back level
    #[arg(long)]
    copy_lvl: Option<u32>,

    /// Replace existing working directories
    #[arg(long, overrides_with = "no_overwrite")]
    overwrite: bool,

    /// Keep existing working directories that hold outputs
    #[arg(long, overrides_with = "overwrite")]
    no_overwrite: bool,

    /// Write a .gitignore into each working directory
    #[arg(long, overrides_with = "no_git")]
    git: bool,

    /// Do not write a .gitignore into working directories
    #[arg(long, overrides_with = "git")]
    no_git: bool,

    /// Maximum number of jobs processed at once
    #[arg(long, env = "BATCHFIT_THREADS")]
    threads: Option<usize>,

    /// Print the batch result as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    /// Overrides to layer over every loaded configuration
    ///
    /// Switches that were not given leave the file's value alone; of a
    /// `--x` / `--no-x` pair the last one given wins.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            version: self.nm_version.clone(),
            parallel: switch(self.parallel, self.no_parallel),
            nodes: self.nodes,
            timeout: self.timeout,
            mpi_exec_path: self.mpi_exec_path.clone(),
            parafile: self.parafile.clone(),
            clean_lvl: self.clean_lvl,
            copy_lvl: self.copy_lvl,
            overwrite: switch(self.overwrite, self.no_overwrite),
            git: switch(self.git, self.no_git),
            threads: self.threads,
        }
    }
}

/// Value of an on/off switch pair, if either was given
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Handle `batchfit run`
pub async fn handle_run(args: RunArgs) -> Result<ExitCode> {
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);

    let paths = resolve_arguments(&args.args, fs.as_ref());
    if paths.is_empty() {
        println!("{}", "No job files matched the given arguments.".yellow());
        return Ok(ExitCode::SUCCESS);
    }
    info!("Resolved {} job file(s)", paths.len());

    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    let mut builder = DescriptorBuilder::new(Arc::clone(&fs), args.overrides(), cwd);
    let jobs = builder
        .build_all(&paths)
        .context("Unable to load a usable configuration")?;

    let threads = jobs
        .iter()
        .find_map(|job| job.configuration.as_ref().map(|config| config.threads))
        .unwrap_or(DEFAULT_THREADS);

    let service: Arc<dyn ExecutionService> = match args.target {
        Target::Local => Arc::new(LocalExecutionService::new(Arc::clone(&fs))),
        Target::Sge => Arc::new(GridExecutionService::new(Arc::clone(&fs))),
    };

    let manager = JobManager::new(threads);
    let cancel = manager.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, queued jobs will not be started");
            cancel.cancel();
        }
    });

    let result = manager.run(jobs, service).await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize batch result")?
        );
    } else {
        print_summary(&result, args.target);
    }

    Ok(ExitCode::from(exit_status(&result)))
}

fn exit_status(result: &BatchResult) -> u8 {
    if result.has_failures() {
        JOB_FAILURE_EXIT
    } else {
        0
    }
}

/// Print the end-of-batch summary
fn print_summary(result: &BatchResult, target: Target) {
    let elapsed = result.elapsed();
    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    let verb = match target {
        Target::Local => "completed",
        Target::Sge => "submitted",
    };

    println!();
    println!(
        "{}",
        format!("{} job(s) {} in {:.2}s", result.completed, verb, seconds).bold()
    );
    println!("  Batch:     {}", result.batch_id.to_string().dimmed());

    if result.cancelled > 0 {
        println!(
            "  {}",
            format!("{} job(s) cancelled before starting", result.cancelled).yellow()
        );
    }

    if result.has_failures() {
        println!(
            "  {}",
            format!("{} job(s) failed:", result.errors).red().bold()
        );
        for failure in &result.failures {
            println!("    {} {}", "✗".red(), failure.job.bold());
            println!("      {}", failure.message);
            if let Some(cause) = &failure.cause {
                for line in cause.lines() {
                    println!("      {}", line.dimmed());
                }
            }
        }
    } else if result.completed > 0 {
        println!("  {}", "✓ No errors".green());
    }
}
