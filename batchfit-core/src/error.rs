//! Error types for batchfit
//!
//! Errors fall into four families:
//! - [`ConfigError`]: fatal for the whole process, raised before any job runs
//! - [`JobError`]: fatal for one job only, recorded in the batch result
//! - [`TemplateError`]: rendering failures, surfaced through [`JobError`]
//! - [`RangeError`]: malformed `[low:high]` arguments, logged and skipped

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::job::JobState;

/// Result type alias for per-job operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Configuration problems that stop the process before any job executes
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was found in the job directory or its ancestors
    #[error("no {file_name} found in {searched} or any parent directory")]
    Missing {
        /// Name of the configuration file looked for
        file_name: String,
        /// Directory the search started from
        searched: PathBuf,
    },

    /// The configuration file exists but could not be read or parsed
    #[error("failed to parse configuration {path}: {message}")]
    Parse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser or I/O message
        message: String,
    },

    /// The version mapping has no entries
    #[error("no versions are configured; add at least one entry under the `versions` key")]
    EmptyVersions,

    /// A version tag was requested that is not in the mapping
    #[error("version '{0}' was requested but has no entry in the configuration")]
    UnknownVersion(String),

    /// No version tag was requested and no entry is flagged as default
    #[error("no version was requested and no configured version is marked as default")]
    NoDefaultVersion,

    /// More than one entry is flagged as default
    #[error("versions {0:?} are all marked as default; at most one may be")]
    MultipleDefaults(Vec<String>),

    /// A value is outside its allowed range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that can occur while rendering a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{` was opened but never closed
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    /// A placeholder was empty (`{{ }}`)
    #[error("empty placeholder at byte {0}")]
    EmptyKey(usize),

    /// A placeholder names a value that was not supplied
    #[error("unknown placeholder '{0}'")]
    UnknownKey(String),
}

/// A bracketed range argument that cannot be expanded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range '{0}' must have the form low:high")]
    MissingSeparator(String),

    #[error("range bound '{0}' is not a decimal integer")]
    InvalidBound(String),

    #[error("range start {low} is greater than range end {high}")]
    Reversed { low: u32, high: u32 },

    #[error("range {low}:{high} expands to more than {max} job files")]
    TooLarge { low: u32, high: u32, max: u32 },
}

/// Errors that end a single job
///
/// None of these stop the batch; the job manager records them against
/// the job's identity and moves on.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job file does not exist or cannot be stat'ed
    #[error("job file {path} could not be accessed")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The working directory holds outputs from a previous run
    #[error(
        "working directory {0} already contains outputs from a previous run and overwrite is disabled"
    )]
    Conflict(PathBuf),

    /// A filesystem operation failed
    #[error("failed to {action} {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A template could not be rendered
    #[error("failed to render the {what} template")]
    Template {
        what: &'static str,
        #[source]
        source: TemplateError,
    },

    /// The compute binary version could not be resolved
    #[error("unable to resolve the compute binary")]
    Version(#[from] ConfigError),

    /// The external process could not be started
    #[error("failed to launch `{command}`")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The external process ran but reported failure
    #[error("`{command}` exited with {}", describe_exit(.code))]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A job was driven through an illegal state change
    #[error("invalid job state transition {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl JobError {
    /// Shorthand for building an [`JobError::Io`]
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Check if this error is a working-directory conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Underlying cause rendered as text, if there is one
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::ExitStatus { stderr, .. } if !stderr.trim().is_empty() => {
                Some(stderr.trim().to_string())
            }
            _ => std::error::Error::source(self).map(|source| source.to_string()),
        }
    }
}
