//! Job manager
//!
//! Runs every job of a batch in its own task. A semaphore bounds how many
//! jobs hold a slot at once; a job keeps its slot from staging until its
//! execution (and, locally, post-work) is done.
//!
//! Cancellation is cooperative: it is checked once a job gets its slot and
//! before it leaves `Queued`. Jobs already running are never interrupted.

use batchfit_core::domain::batch::BatchResult;
use batchfit_core::domain::job::{JobDescriptor, JobState};
use batchfit_core::error::JobError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

use crate::service::ExecutionService;

/// Cancels a running batch from anywhere, e.g. a signal handler
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Stops queued jobs from starting
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Bounded-concurrency batch runner
pub struct JobManager {
    semaphore: Arc<Semaphore>,
    cancel_tx: Arc<watch::Sender<bool>>,
    result: Arc<Mutex<BatchResult>>,
}

fn lock(result: &Mutex<BatchResult>) -> MutexGuard<'_, BatchResult> {
    result.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobManager {
    /// Creates a manager running at most `max_parallel_jobs` jobs at once
    pub fn new(max_parallel_jobs: usize) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs.max(1))),
            cancel_tx: Arc::new(cancel_tx),
            result: Arc::new(Mutex::new(BatchResult::new())),
        }
    }

    /// Handle that cancels this manager's batch
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Runs every job and waits for all of them
    ///
    /// # Arguments
    /// * `jobs` - Descriptors, including ones that already carry an error
    /// * `service` - Execution target
    ///
    /// # Returns
    /// The finished batch result
    pub async fn run(
        self,
        jobs: Vec<JobDescriptor>,
        service: Arc<dyn ExecutionService>,
    ) -> BatchResult {
        info!(
            "Starting batch of {} job(s), {} at a time",
            jobs.len(),
            self.semaphore.available_permits()
        );

        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let identity = job.identity();
            let semaphore = Arc::clone(&self.semaphore);
            let cancel_rx = self.cancel_tx.subscribe();
            let result = Arc::clone(&self.result);
            let service = Arc::clone(&service);

            let handle = tokio::spawn(async move {
                let id = job.log_identifier();

                let Ok(_permit) = semaphore.acquire_owned().await else {
                    lock(&result).record_cancelled();
                    return;
                };

                if *cancel_rx.borrow() {
                    info!("{} Batch cancelled, job will not start", id);
                    lock(&result).record_cancelled();
                    return;
                }

                let identity = job.identity();
                match Self::process_job(job, service.as_ref()).await {
                    Ok(()) => {
                        info!("{} Completed", id);
                        lock(&result).record_completed();
                    }
                    Err(e) => {
                        error!("{} {}", id, e);
                        if e.is_conflict() {
                            warn!("{} Use --overwrite to replace the existing outputs", id);
                        }
                        lock(&result).record_failure(identity, &e);
                    }
                }
                // Permit is released when dropped
            });

            handles.push((identity, handle));
        }

        for (identity, handle) in handles {
            if let Err(e) = handle.await {
                warn!("Job task for {} panicked: {}", identity, e);
                lock(&self.result).record_failure_message(
                    identity,
                    "worker task panicked",
                    Some(e.to_string()),
                );
            }
        }

        let mut result = lock(&self.result).clone();
        result.finish();

        info!(
            "{} job(s) completed in {}ms",
            result.completed,
            result.elapsed().num_milliseconds()
        );
        if result.has_failures() {
            error!("{} error(s) were experienced during the batch", result.errors);
            for failure in &result.failures {
                error!("{} failed: {}", failure.job, failure.message);
            }
        }

        result
    }

    /// Drives one job through its states
    async fn process_job(
        mut job: JobDescriptor,
        service: &dyn ExecutionService,
    ) -> Result<(), JobError> {
        let id = job.log_identifier();
        let mut state = JobState::Queued;

        if let Some(error) = job.take_error() {
            return Err(Self::fail(state, &id, error));
        }

        state = state.transition(JobState::Staging)?;
        debug!("{} {}", id, state);
        let plan = match service.prepare(&job).await {
            Ok(plan) => plan,
            Err(e) => return Err(Self::fail(state, &id, e)),
        };

        state = state.transition(JobState::Executing)?;
        debug!("{} {}", id, state);
        if let Err(e) = service.execute(&job, &plan).await {
            return Err(Self::fail(state, &id, e));
        }

        state = state.transition(JobState::Completed)?;
        debug!("{} {}", id, state);
        Ok(())
    }

    fn fail(state: JobState, id: &str, error: JobError) -> JobError {
        match state.transition(JobState::Failed) {
            Ok(failed) => {
                debug!("{} {} -> {}", id, state, failed);
                error
            }
            Err(invalid) => invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ExecutionPlan;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts concurrent executions; fails jobs whose file name is listed
    #[derive(Default)]
    struct FakeService {
        running: AtomicUsize,
        max_running: AtomicUsize,
        prepared: AtomicUsize,
        failing: Vec<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ExecutionService for FakeService {
        async fn prepare(&self, _job: &JobDescriptor) -> batchfit_core::error::Result<ExecutionPlan> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionPlan {
                command: "fit".to_string(),
                script: String::new(),
                parafile: None,
            })
        }

        async fn execute(
            &self,
            job: &JobDescriptor,
            _plan: &ExecutionPlan,
        ) -> batchfit_core::error::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay.unwrap_or(Duration::from_millis(20))).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&job.job_file) {
                return Err(JobError::ExitStatus {
                    command: "fit".to_string(),
                    code: Some(1),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn job(name: &str) -> JobDescriptor {
        let mut job = JobDescriptor::failed(
            PathBuf::from(format!("/models/{}", name)),
            JobError::Conflict(PathBuf::new()),
        );
        job.error = None;
        job.job_file = name.to_string();
        job.base_name = name.trim_end_matches(".mod").to_string();
        job
    }

    fn jobs(count: usize) -> Vec<JobDescriptor> {
        (1..=count).map(|i| job(&format!("run{:03}.mod", i))).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let service = Arc::new(FakeService::default());

        let result = JobManager::new(3).run(jobs(10), service.clone()).await;

        assert_eq!(result.completed, 10);
        assert_eq!(result.errors, 0);
        assert!(service.max_running.load(Ordering::SeqCst) <= 3);
        assert!(service.max_running.load(Ordering::SeqCst) >= 1);
        assert!(result.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_others() {
        let service = Arc::new(FakeService {
            failing: vec!["run002.mod".to_string()],
            ..Default::default()
        });

        let result = JobManager::new(2).run(jobs(5), service).await;

        assert_eq!(result.completed, 4);
        assert_eq!(result.errors, 1);
        assert_eq!(result.failures[0].job, "run002.mod");
        assert_eq!(result.failures[0].cause.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_failed_descriptor_skips_service() {
        let service = Arc::new(FakeService::default());
        let missing = JobDescriptor::failed(
            PathBuf::from("/models/absent.mod"),
            JobError::NotFound {
                path: PathBuf::from("/models/absent.mod"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            },
        );

        let result = JobManager::new(2)
            .run(vec![missing, job("run001.mod")], service.clone())
            .await;

        assert_eq!(result.completed, 1);
        assert_eq!(result.errors, 1);
        assert_eq!(result.failures[0].job, "/models/absent.mod");
        assert_eq!(service.prepared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let service = Arc::new(FakeService::default());
        let manager = JobManager::new(2);
        let handle = manager.cancel_handle();
        handle.cancel();
        assert!(handle.is_cancelled());

        let result = manager.run(jobs(4), service.clone()).await;

        assert_eq!(result.cancelled, 4);
        assert_eq!(result.completed, 0);
        assert_eq!(service.prepared.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_lets_running_jobs_finish() {
        let service = Arc::new(FakeService {
            delay: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let manager = JobManager::new(2);
        let handle = manager.cancel_handle();

        let (result, _) = tokio::join!(manager.run(jobs(6), service.clone()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        assert_eq!(result.completed, 2);
        assert_eq!(result.cancelled, 4);
        assert_eq!(result.errors, 0);
        assert_eq!(service.prepared.load(Ordering::SeqCst), 2);
        assert_eq!(service.running.load(Ordering::SeqCst), 0);
    }
}
