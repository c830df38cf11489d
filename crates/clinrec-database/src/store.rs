//! The persistence seam of the job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use clinrec_core::result::AppResult;
use clinrec_entity::job::{JobChange, JobStats, JobStatus, RecommendationJob};

/// Durable storage for recommendation jobs.
///
/// Every mutation is a conditional update guarded by the row's current
/// status, so concurrent callers in different processes never both win
/// the same change. Timestamps are supplied by the caller; implementations
/// never read the wall clock.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new job row and return it as stored.
    async fn insert(&self, job: &RecommendationJob) -> AppResult<RecommendationJob>;

    /// Find a job by ID.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RecommendationJob>>;

    /// Jobs for a session, newest first.
    async fn find_by_session(
        &self,
        session_id: &str,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>>;

    /// Jobs for a patient, newest first, optionally filtered by status.
    async fn find_by_patient(
        &self,
        patient_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>>;

    /// Atomically claim the best-ranked pending job.
    ///
    /// Ranking is priority descending, then `created_at` ascending, then id.
    /// Returns `None` when nothing is pending or every candidate was taken
    /// by a concurrent claimant.
    async fn claim_next(&self, now: DateTime<Utc>) -> AppResult<Option<RecommendationJob>>;

    /// Apply `change` only if the job's status is one of `expected`.
    ///
    /// When `change.attempt` is set, the row's `attempt_count` must also
    /// equal it, so a report from a claim that was swept and re-claimed
    /// does not land. Returns `None` when the job does not exist or a guard
    /// did not match; the row is untouched in both cases.
    async fn transition(
        &self,
        id: Uuid,
        expected: &[JobStatus],
        change: &JobChange,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RecommendationJob>>;

    /// Cancel every pending or processing job of a session.
    async fn cancel_by_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<u64>;

    /// Pending jobs in claim order.
    async fn pending(&self, limit: i64) -> AppResult<Vec<RecommendationJob>>;

    /// Aggregate counts and mean processing time.
    async fn stats(&self) -> AppResult<JobStats>;

    /// Delete terminal jobs that reached their terminal state before `cutoff`.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Return processing jobs claimed before `claimed_before` to pending.
    async fn requeue_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
