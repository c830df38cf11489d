//! Queue accessor: the only path through which jobs are created, claimed,
//! reported, cancelled, retried, and listed.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use clinrec_core::config::QueueConfig;
use clinrec_core::error::AppError;
use clinrec_core::result::AppResult;
use clinrec_core::traits::clock::Clock;
use clinrec_database::store::JobStore;
use clinrec_entity::job::{
    CreateRecommendationJob, JobChange, JobStatus, RecommendationJob,
};

/// How many times `cancel_job` retries a cancel that lost to a concurrent retry.
const CANCEL_ATTEMPTS: usize = 3;

/// Job queue for enqueuing, claiming, and reporting recommendation work.
///
/// All state changes are conditional on the job's current status in the
/// store, so any number of `JobQueue` instances in any number of processes
/// can share one store.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Enqueue a new `pending` job.
    pub async fn create_job(&self, data: CreateRecommendationJob) -> AppResult<RecommendationJob> {
        data.validate()
            .map_err(|e| AppError::validation(format!("Invalid job request: {e}")))?;

        let job = RecommendationJob::new(data, self.clock.now());
        let job = self.store.insert(&job).await?;

        info!(
            job_id = %job.id,
            session_id = %job.session_id,
            job_type = %job.job_type,
            priority = %job.priority,
            "Enqueued recommendation job"
        );
        Ok(job)
    }

    /// Look up a job. A missing job is `Ok(None)`.
    pub async fn get_job_by_id(&self, job_id: Uuid) -> AppResult<Option<RecommendationJob>> {
        self.store.find_by_id(job_id).await
    }

    /// Claim the best-ranked pending job, moving it to `processing`.
    ///
    /// `Ok(None)` means nothing was pending; pollers should back off.
    pub async fn get_next_pending_job(&self) -> AppResult<Option<RecommendationJob>> {
        let claimed = self.store.claim_next(self.clock.now()).await?;
        if let Some(job) = &claimed {
            debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempt = job.attempt_count,
                "Claimed job"
            );
        }
        Ok(claimed)
    }

    /// Jobs for a session, newest first, capped at the configured limit.
    pub async fn get_jobs_by_session(&self, session_id: &str) -> AppResult<Vec<RecommendationJob>> {
        self.store
            .find_by_session(session_id, self.config.clamp_limit(None))
            .await
    }

    /// Jobs for a patient, newest first.
    pub async fn get_jobs_by_patient(
        &self,
        patient_id: &str,
        status: Option<JobStatus>,
        limit: Option<i64>,
    ) -> AppResult<Vec<RecommendationJob>> {
        self.store
            .find_by_patient(patient_id, status, self.config.clamp_limit(limit))
            .await
    }

    /// Pending jobs in claim order. Read-only; does not claim.
    pub async fn get_job_queue(&self, limit: Option<i64>) -> AppResult<Vec<RecommendationJob>> {
        self.store.pending(self.config.clamp_limit(limit)).await
    }

    /// Apply a caller-requested status change.
    ///
    /// - `processing` claims this specific job (it must be `pending`).
    /// - `failed` requires a non-blank `error_message`.
    /// - `cancelled` is accepted from `pending` or `processing`.
    /// - `completed` is rejected; use [`JobQueue::update_job_results`].
    /// - `pending` is rejected; use [`JobQueue::retry_failed_job`].
    pub async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> AppResult<RecommendationJob> {
        let change = match status {
            JobStatus::Processing => JobChange::claim(),
            JobStatus::Cancelled => JobChange::cancel(),
            JobStatus::Failed => match error_message.filter(|m| !m.trim().is_empty()) {
                Some(message) => JobChange::fail(message),
                None => {
                    return Err(AppError::validation(
                        "An error message is required to mark a job failed",
                    ));
                }
            },
            JobStatus::Completed => {
                return Err(AppError::validation(
                    "Completing a job requires results; use update_job_results",
                ));
            }
            JobStatus::Pending => {
                let job = self.require(job_id).await?;
                return Err(AppError::invalid_transition(format!(
                    "Cannot move job {job_id} from {} to pending; only failed jobs can be retried \
                     through retry_failed_job",
                    job.status
                )));
            }
        };

        let job = self
            .guarded(job_id, &JobStatus::sources_of(status), &change)
            .await?;
        info!(job_id = %job.id, status = %job.status, "Job status updated");
        Ok(job)
    }

    /// Record results for a `processing` job and mark it `completed`.
    pub async fn update_job_results(
        &self,
        job_id: Uuid,
        results: serde_json::Value,
    ) -> AppResult<RecommendationJob> {
        self.complete(job_id, JobChange::complete(results)).await
    }

    /// Complete a job on behalf of the claim that returned `claimed`.
    ///
    /// Rejected with `InvalidTransition` once the job was cancelled, or
    /// swept and claimed again by someone else.
    pub async fn complete_claimed_job(
        &self,
        claimed: &RecommendationJob,
        results: serde_json::Value,
    ) -> AppResult<RecommendationJob> {
        self.complete(
            claimed.id,
            JobChange::complete(results).for_attempt(claimed.attempt_count),
        )
        .await
    }

    /// Fail a job on behalf of the claim that returned `claimed`.
    pub async fn fail_claimed_job(
        &self,
        claimed: &RecommendationJob,
        error_message: impl Into<String>,
    ) -> AppResult<RecommendationJob> {
        let message = error_message.into();
        if message.trim().is_empty() {
            return Err(AppError::validation(
                "An error message is required to mark a job failed",
            ));
        }
        let change = JobChange::fail(message).for_attempt(claimed.attempt_count);
        let job = self
            .guarded(claimed.id, &[JobStatus::Processing], &change)
            .await?;
        info!(job_id = %job.id, attempt = job.attempt_count, "Job failed");
        Ok(job)
    }

    async fn complete(&self, job_id: Uuid, change: JobChange) -> AppResult<RecommendationJob> {
        let job = self
            .guarded(job_id, &[JobStatus::Processing], &change)
            .await?;
        info!(job_id = %job.id, attempt = job.attempt_count, "Job completed");
        Ok(job)
    }

    /// Cancel a pending or processing job.
    ///
    /// Returns `false` when the job had already reached a terminal state.
    /// Cancellation is cooperative: a worker already executing the job is
    /// not interrupted, but its report will be rejected.
    pub async fn cancel_job(&self, job_id: Uuid) -> AppResult<bool> {
        for _ in 0..CANCEL_ATTEMPTS {
            let cancelled = self
                .store
                .transition(
                    job_id,
                    &JobStatus::ACTIVE,
                    &JobChange::cancel(),
                    self.clock.now(),
                )
                .await?;
            if cancelled.is_some() {
                info!(job_id = %job_id, "Job cancelled");
                return Ok(true);
            }

            let job = self.require(job_id).await?;
            if job.is_terminal() {
                debug!(job_id = %job_id, status = %job.status, "Cancel on finished job ignored");
                return Ok(false);
            }
            // Retried between the two reads; try the conditional cancel again.
        }

        warn!(job_id = %job_id, "Cancel kept racing with retries; giving up");
        Err(AppError::invalid_transition(format!(
            "Job {job_id} changed status on every cancel attempt"
        )))
    }

    /// Cancel every pending or processing job of a session.
    pub async fn cancel_jobs_by_session(&self, session_id: &str) -> AppResult<u64> {
        let count = self
            .store
            .cancel_by_session(session_id, self.clock.now())
            .await?;
        info!(session_id = %session_id, count, "Cancelled session jobs");
        Ok(count)
    }

    /// Return a `failed` job to `pending`. `attempt_count` is kept.
    pub async fn retry_failed_job(&self, job_id: Uuid) -> AppResult<RecommendationJob> {
        self.requeue(job_id, JobChange::requeue()).await
    }

    /// Requeue a job that `failed` was returned for, unless someone else has
    /// retried and claimed it since.
    pub async fn retry_claimed_job(&self, failed: &RecommendationJob) -> AppResult<RecommendationJob> {
        self.requeue(failed.id, JobChange::requeue().for_attempt(failed.attempt_count))
            .await
    }

    async fn requeue(&self, job_id: Uuid, change: JobChange) -> AppResult<RecommendationJob> {
        let job = self.guarded(job_id, &[JobStatus::Failed], &change).await?;
        info!(job_id = %job.id, attempt = job.attempt_count, "Job requeued for retry");
        Ok(job)
    }

    /// Run a conditional transition and explain a rejection.
    async fn guarded(
        &self,
        job_id: Uuid,
        expected: &[JobStatus],
        change: &JobChange,
    ) -> AppResult<RecommendationJob> {
        if let Some(job) = self
            .store
            .transition(job_id, expected, change, self.clock.now())
            .await?
        {
            return Ok(job);
        }

        let current = self.require(job_id).await?;
        if expected.contains(&current.status) && !change.matches_claim(&current) {
            warn!(
                job_id = %job_id,
                attempt = ?change.attempt,
                current_attempt = current.attempt_count,
                "Rejected report from a superseded claim"
            );
            return Err(AppError::invalid_transition(format!(
                "Job {job_id} is now on attempt {}; the reporting claim no longer holds it",
                current.attempt_count
            )));
        }

        warn!(
            job_id = %job_id,
            from = %current.status,
            to = %change.status,
            "Rejected job transition"
        );
        Err(AppError::invalid_transition(format!(
            "Cannot move job {job_id} from {} to {}",
            current.status, change.status
        )))
    }

    async fn require(&self, job_id: Uuid) -> AppResult<RecommendationJob> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
    }
}
