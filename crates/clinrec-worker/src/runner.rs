//! Worker runner: the main loop that claims jobs and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::time;

use clinrec_core::config::WorkerConfig;
use clinrec_core::error::{AppError, ErrorKind};
use clinrec_entity::job::RecommendationJob;

use crate::executor::JobExecutor;
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;

/// What happened to a claimed job once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Results were stored.
    Completed,
    /// Marked failed and left there.
    Failed,
    /// Marked failed, then returned to `pending` by the retry policy.
    Retried,
    /// The report was rejected because the job was cancelled, requeued or
    /// deleted while it ran. The handler's output was dropped.
    Discarded,
    /// The report could not be written; the staleness sweep will pick the
    /// job up again.
    ReportFailed,
}

/// Empty-poll delay that doubles up to a ceiling and resets on a claim.
#[derive(Debug, Clone)]
struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |doubled| doubled.min(self.max));
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Main worker runner that polls the queue and executes jobs
#[derive(Debug)]
pub struct WorkerRunner {
    /// Job queue for claiming and reporting
    queue: Arc<JobQueue>,
    /// Job executor for dispatching
    executor: Arc<JobExecutor>,
    /// Worker configuration
    config: WorkerConfig,
    /// Decides whether transient failures go back to `pending`
    policy: RetryPolicy,
    /// Worker identifier
    worker_id: String,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<JobExecutor>,
        config: WorkerConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        let policy = RetryPolicy::new(config.max_attempts);
        Self {
            queue,
            executor,
            config,
            policy,
            worker_id: worker_id.into(),
        }
    }

    /// Override the retry policy derived from the configuration
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Worker identifier used in logs
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Start the worker runner; runs until the cancel signal is received
    ///
    /// Dropping the sender also stops the loop. In-flight jobs are given
    /// `shutdown_timeout_seconds` to finish. Returns at once when the
    /// worker is disabled in configuration.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!(worker_id = %self.worker_id, "Worker disabled; not polling");
            return;
        }

        let concurrency = self.config.concurrency.max(1);
        tracing::info!(
            worker_id = %self.worker_id,
            concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            max_backoff_ms = self.config.max_backoff_ms,
            max_attempts = self.policy.max_attempts,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.poll_interval_ms),
            Duration::from_millis(self.config.max_backoff_ms),
        );

        loop {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delay = match self.queue.get_next_pending_job().await {
                Ok(Some(job)) => {
                    backoff.reset();
                    self.spawn_job(job, permit);
                    continue;
                }
                Ok(None) => {
                    tracing::trace!(worker_id = %self.worker_id, "No pending jobs");
                    backoff.next_delay()
                }
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Failed to claim job");
                    backoff.next_delay()
                }
            };

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(delay) => {}
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Worker waiting for in-flight jobs to complete");

        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let drained = time::timeout(
            Duration::from_secs(self.config.shutdown_timeout_seconds),
            semaphore.acquire_many(permits),
        )
        .await;
        if drained.is_err() {
            tracing::warn!(
                worker_id = %self.worker_id,
                "Shutdown timed out with jobs still running; the staleness sweep will requeue them"
            );
        }

        tracing::info!(worker_id = %self.worker_id, "Worker shut down");
    }

    /// Execute one claimed job and report its outcome
    pub async fn process(&self, job: RecommendationJob) -> JobOutcome {
        process_job(&self.queue, &self.executor, self.policy, job).await
    }

    fn spawn_job(&self, job: RecommendationJob, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let executor = Arc::clone(&self.executor);
        let policy = self.policy;
        let worker_id = self.worker_id.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let job_id = job.id;
            let outcome = process_job(&queue, &executor, policy, job).await;
            tracing::debug!(worker_id = %worker_id, job_id = %job_id, ?outcome, "Job finished");
        });
    }
}

async fn process_job(
    queue: &JobQueue,
    executor: &JobExecutor,
    policy: RetryPolicy,
    job: RecommendationJob,
) -> JobOutcome {
    let job_id = job.id;

    let err = match executor.execute(&job).await {
        Ok(results) => {
            return match queue.complete_claimed_job(&job, results).await {
                Ok(_) => JobOutcome::Completed,
                Err(e) => report_rejected(job_id, "completion", e),
            };
        }
        Err(err) => err,
    };

    let mut message = err.message();
    if message.trim().is_empty() {
        message = "Job failed without an error message".to_string();
    }
    if err.is_transient() {
        tracing::warn!(job_id = %job_id, attempt = job.attempt_count, error = %message, "Job failed (transient)");
    } else {
        tracing::error!(job_id = %job_id, attempt = job.attempt_count, error = %message, "Job failed");
    }

    let failed = match queue.fail_claimed_job(&job, message).await {
        Ok(failed) => failed,
        Err(e) => return report_rejected(job_id, "failure", e),
    };

    if !policy.should_retry(&failed, &err) {
        return JobOutcome::Failed;
    }

    match queue.retry_claimed_job(&failed).await {
        Ok(_) => JobOutcome::Retried,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Could not requeue failed job");
            JobOutcome::Failed
        }
    }
}

fn report_rejected(job_id: uuid::Uuid, report: &str, err: AppError) -> JobOutcome {
    if err.is(ErrorKind::InvalidTransition) || err.is(ErrorKind::NotFound) {
        tracing::info!(job_id = %job_id, report, reason = %err, "Discarding report for job no longer held");
        JobOutcome::Discarded
    } else {
        tracing::error!(job_id = %job_id, report, error = %err, "Failed to report job outcome");
        JobOutcome::ReportFailed
    }
}
