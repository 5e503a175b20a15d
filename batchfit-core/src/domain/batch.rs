//! Batch result domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Aggregate outcome of one batch
///
/// Created empty when the batch starts, written by every worker through the
/// job manager, and read once the batch is finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Jobs that reached `Completed`
    pub completed: usize,
    /// Jobs that reached `Failed`
    pub errors: usize,
    /// Jobs never started because the batch was cancelled
    pub cancelled: usize,
    /// Per-job failures in the order they were recorded
    pub failures: Vec<JobFailure>,
}

/// A single job's failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job: String,
    pub message: String,
    pub cause: Option<String>,
}

impl BatchResult {
    /// Creates an empty result stamped with the current time
    pub fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            completed: 0,
            errors: 0,
            cancelled: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_completed(&mut self) {
        self.completed += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Records a failed job under `job`
    pub fn record_failure(&mut self, job: impl Into<String>, error: &JobError) {
        self.record_failure_message(job, error.to_string(), error.cause());
    }

    /// Records a failure that has no [`JobError`], such as a worker panic
    pub fn record_failure_message(
        &mut self,
        job: impl Into<String>,
        message: impl Into<String>,
        cause: Option<String>,
    ) {
        self.errors += 1;
        self.failures.push(JobFailure {
            job: job.into(),
            message: message.into(),
            cause,
        });
    }

    /// Stamps the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall time between start and finish (or now, if unfinished)
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
    }

    pub fn has_failures(&self) -> bool {
        self.errors > 0
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}
