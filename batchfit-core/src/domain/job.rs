//! Job domain types

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::config::Configuration;
use crate::error::{ConfigError, JobError};

/// Job file extensions recognised when a directory is given as an argument
pub const JOB_FILE_EXTENSIONS: &[&str] = &["mod", "ctl"];

/// One unit of work: a job file plus everything needed to run it
///
/// Built once per resolved argument and then owned by exactly one worker.
#[derive(Debug)]
pub struct JobDescriptor {
    /// Version of batchfit that built this descriptor
    pub tool_version: String,
    /// Job file name, e.g. `run001.mod`
    pub job_file: String,
    /// Absolute path of the original job file
    pub path: PathBuf,
    /// Dataset referenced by the job file
    pub data_path: Option<PathBuf>,
    /// Hex SHA-256 of the dataset contents
    pub data_hash: Option<String>,
    /// File name without extension, e.g. `run001`
    pub base_name: String,
    /// Extension without the separator, e.g. `mod`
    pub extension: String,
    /// Directory holding the original job file
    pub source_dir: PathBuf,
    /// Directory the job is staged into and executed from
    pub working_dir: PathBuf,
    pub configuration: Option<Arc<Configuration>>,
    pub error: Option<JobError>,
}

impl JobDescriptor {
    /// Creates a descriptor that carries only a terminal error
    ///
    /// The path is kept so the failure can be reported against something
    /// the operator recognises.
    pub fn failed(path: PathBuf, error: JobError) -> Self {
        Self {
            tool_version: String::new(),
            job_file: String::new(),
            path,
            data_path: None,
            data_hash: None,
            base_name: String::new(),
            extension: String::new(),
            source_dir: PathBuf::new(),
            working_dir: PathBuf::new(),
            configuration: None,
            error: Some(error),
        }
    }

    /// Name used when reporting on this job
    pub fn identity(&self) -> String {
        if self.job_file.is_empty() {
            self.path.display().to_string()
        } else {
            self.job_file.clone()
        }
    }

    /// Prefix for per-job log lines, e.g. `[run001]`
    pub fn log_identifier(&self) -> String {
        if self.base_name.is_empty() {
            format!("[{}]", self.path.display())
        } else {
            format!("[{}]", self.base_name)
        }
    }

    /// Whether the descriptor failed while it was being built
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Configuration the job was built against
    ///
    /// # Errors
    /// Only failed descriptors lack one.
    pub fn config(&self) -> Result<&Configuration, JobError> {
        self.configuration.as_deref().ok_or_else(|| {
            JobError::Version(ConfigError::Invalid(format!(
                "{} has no configuration",
                self.identity()
            )))
        })
    }

    /// Takes the terminal error, leaving none behind
    pub fn take_error(&mut self) -> Option<JobError> {
        self.error.take()
    }

    /// Job file copy inside the working directory
    pub fn staged_job_file(&self) -> PathBuf {
        self.working_dir.join(&self.job_file)
    }

    /// Report file written by the compute binary
    pub fn report_file(&self) -> PathBuf {
        self.working_dir.join(format!("{}.lst", self.base_name))
    }

    /// Parallel configuration file
    pub fn parafile(&self) -> PathBuf {
        self.working_dir.join(format!("{}.pnm", self.base_name))
    }

    /// Name of the rendered execution script
    pub fn script_name(&self) -> String {
        format!("{}.sh", self.base_name)
    }

    /// Rendered execution script
    pub fn script_path(&self) -> PathBuf {
        self.working_dir.join(self.script_name())
    }
}

/// Splits a file name on its first `.` into base name and extension
///
/// A name without a separator is all base name with an empty extension.
pub fn split_file_name(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((base, extension)) => (base.to_string(), extension.to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Whether `path` carries one of the job file extensions
pub fn is_job_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| JOB_FILE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Lifecycle state of a job inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Staging,
    Executing,
    Completed,
    Failed,
}

impl JobState {
    /// Whether `self -> next` is a legal move
    ///
    /// `Failed` can be reached from every non-terminal state; the happy
    /// path is `Queued -> Staging -> Executing -> Completed`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Staging)
                | (JobState::Staging, JobState::Executing)
                | (JobState::Executing, JobState::Completed)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Staging, JobState::Failed)
                | (JobState::Executing, JobState::Failed)
        )
    }

    /// Moves to `next`, rejecting illegal transitions
    pub fn transition(self, next: JobState) -> Result<JobState, JobError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(JobError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "Queued"),
            JobState::Staging => write!(f, "Staging"),
            JobState::Executing => write!(f, "Executing"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}
