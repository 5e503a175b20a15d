//! Execution planning
//!
//! Produces what a staged job needs to run:
//! - The compute binary command line
//! - The wrapping shell script
//! - The parallel configuration file, when parallel execution is on
//!
//! [`write_plan`] puts the artifacts into the working directory.

use batchfit_core::domain::config::{Configuration, ParallelConfig};
use batchfit_core::domain::job::JobDescriptor;
use batchfit_core::error::{JobError, Result};
use batchfit_core::fs::FileSystem;
use batchfit_core::template;
use tracing::debug;

/// Skips the compute binary's build step. Stays off until build outputs
/// can be reused between runs.
const NO_BUILD: bool = false;

/// Flag passed when [`NO_BUILD`] is on
const NO_BUILD_FLAG: &str = "--nobuild";

/// Mode of the rendered script
const SCRIPT_MODE: u32 = 0o755;

const SCRIPT_TEMPLATE: &str = "#!/bin/bash

#$ -wd {{working_directory}}

{{command}}
";

// PARSE_TYPE=2 balances work evenly, TRANSFER_TYPE=1 is MPI, TIMEOUTI is
// the node availability wait in seconds.
const PARAFILE_TEMPLATE: &str = "$GENERAL
NODES={{total_nodes}} PARSE_TYPE=2 TIMEOUTI=100 TIMEOUT={{completion_timeout}} PARAPRINT=0 TRANSFER_TYPE=1
$COMMANDS
1: {{mpi_exec_path}} -wdir \"$PWD\" -n {{head_nodes}} ./nonmem $*
2:-wdir \"$PWD\" -n {{worker_nodes}} ./nonmem -wnf
$DIRECTORIES
1:NONE
2-[nodes]:worker{#-1}
";

/// Everything needed to launch one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Compute binary invocation
    pub command: String,
    /// Shell script wrapping `command`
    pub script: String,
    /// Parallel configuration file contents
    pub parafile: Option<String>,
}

/// Builds the compute binary command for a staged job
///
/// `<home>/run/<executable> <job> "" <base>.lst "" [--nobuild] [-parafile=<base>.pnm]`,
/// joined with single spaces so the empty placeholders become double spaces.
///
/// # Errors
/// [`JobError::Version`] when no compute binary can be selected.
pub fn build_command(job: &JobDescriptor, config: &Configuration) -> Result<String> {
    let (_, entry) = config.resolve_version()?;

    let mut args = vec![
        job.staged_job_file().display().to_string(),
        String::new(),
        job.report_file().display().to_string(),
        String::new(),
    ];

    if NO_BUILD {
        args.push(NO_BUILD_FLAG.to_string());
    }

    if config.parallel.enabled {
        args.push(format!("-parafile={}", job.parafile().display()));
    }

    Ok(format!(
        "{} {}",
        entry.executable_path().display(),
        args.join(" ")
    ))
}

/// Renders the parallel configuration file
///
/// One head node, the rest workers.
pub fn render_parafile(parallel: &ParallelConfig) -> Result<String> {
    let total = parallel.nodes.to_string();
    let workers = parallel.nodes.saturating_sub(1).to_string();
    let timeout = parallel.timeout.to_string();

    template::render(
        PARAFILE_TEMPLATE,
        &[
            ("total_nodes", total.as_str()),
            ("completion_timeout", timeout.as_str()),
            ("mpi_exec_path", parallel.mpi_exec_path.as_str()),
            ("head_nodes", "1"),
            ("worker_nodes", workers.as_str()),
        ],
    )
    .map_err(|source| JobError::Template {
        what: "parallel configuration",
        source,
    })
}

/// Parallel configuration for a job
///
/// An operator-supplied file is used verbatim; otherwise the template is
/// rendered.
///
/// # Errors
/// Fails if the supplied file cannot be read.
pub fn parafile_contents(parallel: &ParallelConfig, fs: &dyn FileSystem) -> Result<String> {
    let Some(path) = parallel.parafile.as_deref().filter(|p| !p.as_os_str().is_empty()) else {
        return render_parafile(parallel);
    };

    let bytes = fs
        .read(path)
        .map_err(|e| JobError::io("read parallel configuration", path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Wraps `command` in the execution script for `job`
pub fn render_script(job: &JobDescriptor, command: &str) -> Result<String> {
    let working_directory = job.working_dir.display().to_string();
    template::render(
        SCRIPT_TEMPLATE,
        &[
            ("working_directory", working_directory.as_str()),
            ("command", command),
        ],
    )
    .map_err(|source| JobError::Template {
        what: "execution script",
        source,
    })
}

/// Plans a staged job
pub fn plan_job(job: &JobDescriptor, fs: &dyn FileSystem) -> Result<ExecutionPlan> {
    let config = job.config()?;

    let command = build_command(job, config)?;
    let script = render_script(job, &command)?;
    let parafile = if config.parallel.enabled {
        Some(parafile_contents(&config.parallel, fs)?)
    } else {
        None
    };

    debug!("{} Command: {}", job.log_identifier(), command);

    Ok(ExecutionPlan {
        command,
        script,
        parafile,
    })
}

/// Writes the plan's artifacts into the working directory
///
/// The script is made executable; the parallel configuration, if any, is
/// written as `<base>.pnm`.
pub fn write_plan(job: &JobDescriptor, plan: &ExecutionPlan, fs: &dyn FileSystem) -> Result<()> {
    let script_path = job.script_path();
    fs.write(&script_path, plan.script.as_bytes())
        .map_err(|e| JobError::io("write script", &script_path, e))?;
    make_executable(&script_path, fs)?;

    if let Some(parafile) = &plan.parafile {
        let path = job.parafile();
        fs.write(&path, parafile.as_bytes())
            .map_err(|e| JobError::io("write parallel configuration", &path, e))?;
    }

    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path, fs: &dyn FileSystem) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs.set_permissions(path, std::fs::Permissions::from_mode(SCRIPT_MODE))
        .map_err(|e| JobError::io("set permissions on", path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path, _fs: &dyn FileSystem) -> Result<()> {
    let _ = SCRIPT_MODE;
    Ok(())
}
