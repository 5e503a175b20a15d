//! Execution services
//!
//! Both targets share the same preparation:
//! - Stage the working directory
//! - Plan the command, script and parallel configuration
//! - Write those artifacts
//!
//! They differ in what happens next. Local execution waits for the compute
//! binary and then copies and cleans. Grid execution only waits for the
//! submission command, since the job itself runs later elsewhere.

use async_trait::async_trait;
use batchfit_core::domain::job::JobDescriptor;
use batchfit_core::error::{JobError, Result};
use batchfit_core::fs::FileSystem;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::planner::{ExecutionPlan, plan_job, write_plan};
use crate::policy::new_post_work_instructions;
use crate::service::post_work;
use crate::staging::prepare_working_directory;

/// Service trait for running staged jobs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Stages the job and writes its execution artifacts
    ///
    /// # Arguments
    /// * `job` - Descriptor without a terminal error
    ///
    /// # Returns
    /// The plan written into the working directory
    async fn prepare(&self, job: &JobDescriptor) -> Result<ExecutionPlan>;

    /// Runs a prepared job
    ///
    /// # Arguments
    /// * `job` - The prepared job
    /// * `plan` - Plan returned by [`ExecutionService::prepare`]
    async fn execute(&self, job: &JobDescriptor, plan: &ExecutionPlan) -> Result<()>;
}

/// Staging and planning shared by every target
fn stage_and_plan(job: &JobDescriptor, fs: &dyn FileSystem) -> Result<ExecutionPlan> {
    prepare_working_directory(job, fs)?;
    let plan = plan_job(job, fs)?;
    write_plan(job, &plan, fs)?;
    Ok(plan)
}

/// Runs `program args...` in `dir` and waits for it
///
/// # Errors
/// [`JobError::Launch`] if it cannot be started, [`JobError::ExitStatus`]
/// if it exits unsuccessfully.
async fn run_command(program: &str, args: &[&str], dir: &Path) -> Result<Output> {
    let display = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|source| JobError::Launch {
            command: display.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(JobError::ExitStatus {
            command: display,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}

/// Runs jobs on this machine
pub struct LocalExecutionService {
    fs: Arc<dyn FileSystem>,
}

impl LocalExecutionService {
    /// Creates a new local execution service
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ExecutionService for LocalExecutionService {
    async fn prepare(&self, job: &JobDescriptor) -> Result<ExecutionPlan> {
        stage_and_plan(job, self.fs.as_ref())
    }

    async fn execute(&self, job: &JobDescriptor, _plan: &ExecutionPlan) -> Result<()> {
        let id = job.log_identifier();
        let script = job.script_name();

        info!("{} Beginning local execution", id);
        let output = run_command("bash", &[script.as_str()], &job.working_dir).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} Output:\n{}", id, stdout.trim_end());
        }

        let instructions = new_post_work_instructions(job, self.fs.as_ref(), &[], &[script]);
        let (copied, removed) = post_work::apply(&instructions, self.fs.as_ref())?;
        info!(
            "{} Execution complete, copied {} file(s) and removed {} scratch entries",
            id, copied, removed
        );

        Ok(())
    }
}

/// Submits jobs to a grid engine
pub struct GridExecutionService {
    fs: Arc<dyn FileSystem>,
}

impl GridExecutionService {
    /// Creates a new grid execution service
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ExecutionService for GridExecutionService {
    async fn prepare(&self, job: &JobDescriptor) -> Result<ExecutionPlan> {
        stage_and_plan(job, self.fs.as_ref())
    }

    async fn execute(&self, job: &JobDescriptor, _plan: &ExecutionPlan) -> Result<()> {
        let id = job.log_identifier();
        let config = job.config()?;
        let script = job.script_name();

        let mut parts = config.grid_submit_command.split_whitespace();
        let program = parts.next().unwrap_or("qsub");
        let mut args: Vec<&str> = parts.collect();
        args.push(script.as_str());

        let output = run_command(program, &args, &job.working_dir).await?;
        info!(
            "{} Submitted to the grid: {}",
            id,
            String::from_utf8_lossy(&output.stdout).trim()
        );

        Ok(())
    }
}
