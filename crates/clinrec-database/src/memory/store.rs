//! In-memory job store backed by `dashmap`.
//!
//! Each mutation re-checks the row's status while holding that row's shard
//! lock, which gives the same compare-and-swap guarantee as the conditional
//! UPDATEs of the PostgreSQL store. Candidate selection happens on a
//! snapshot taken before any row is locked.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use clinrec_core::result::AppResult;
use clinrec_entity::job::{JobChange, JobStats, JobStatus, RecommendationJob};

use crate::store::JobStore;

/// Job store held entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<Uuid, RecommendationJob>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshot of jobs matching `filter`, sorted by `key`.
    fn select<F, K>(&self, filter: F, key: impl Fn(&RecommendationJob) -> K) -> Vec<RecommendationJob>
    where
        F: Fn(&RecommendationJob) -> bool,
        K: Ord,
    {
        let mut jobs: Vec<RecommendationJob> = self
            .jobs
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| key(job));
        jobs
    }

    /// Apply `change` to `id` if its status is in `expected` and it is still
    /// held by the claim the change names.
    fn compare_and_apply(
        &self,
        id: Uuid,
        expected: &[JobStatus],
        change: &JobChange,
        now: DateTime<Utc>,
    ) -> Option<RecommendationJob> {
        let mut entry = self.jobs.get_mut(&id)?;
        if !expected.contains(&entry.status) || !change.matches_claim(&entry) {
            return None;
        }
        entry.apply(change, now);
        Some(entry.value().clone())
    }
}

fn claim_order(job: &RecommendationJob) -> (Reverse<u8>, DateTime<Utc>, Uuid) {
    (
        Reverse(job.priority.numeric_priority()),
        job.created_at,
        job.id,
    )
}

fn newest_first(job: &RecommendationJob) -> (Reverse<DateTime<Utc>>, Reverse<Uuid>) {
    (Reverse(job.created_at), Reverse(job.id))
}

fn limit_of(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &RecommendationJob) -> AppResult<RecommendationJob> {
        self.jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RecommendationJob>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_session(
        &self,
        session_id: &str,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>> {
        let mut jobs = self.select(|job| job.session_id == session_id, newest_first);
        jobs.truncate(limit_of(limit));
        Ok(jobs)
    }

    async fn find_by_patient(
        &self,
        patient_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>> {
        let mut jobs = self.select(
            |job| job.patient_id == patient_id && status.is_none_or(|s| job.status == s),
            newest_first,
        );
        jobs.truncate(limit_of(limit));
        Ok(jobs)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> AppResult<Option<RecommendationJob>> {
        let candidates = self.select(|job| job.status == JobStatus::Pending, claim_order);
        for candidate in candidates {
            if let Some(job) =
                self.compare_and_apply(candidate.id, &[JobStatus::Pending], &JobChange::claim(), now)
            {
                return Ok(Some(job));
            }
            debug!(job_id = %candidate.id, "Claim lost to a concurrent worker");
        }
        Ok(None)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[JobStatus],
        change: &JobChange,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RecommendationJob>> {
        Ok(self.compare_and_apply(id, expected, change, now))
    }

    async fn cancel_by_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<u64> {
        let ids: Vec<Uuid> = self
            .select(|job| job.session_id == session_id, |job| job.id)
            .into_iter()
            .map(|job| job.id)
            .collect();

        let cancelled = ids
            .into_iter()
            .filter_map(|id| {
                self.compare_and_apply(id, &JobStatus::ACTIVE, &JobChange::cancel(), now)
            })
            .count();
        Ok(cancelled as u64)
    }

    async fn pending(&self, limit: i64) -> AppResult<Vec<RecommendationJob>> {
        let mut jobs = self.select(|job| job.status == JobStatus::Pending, claim_order);
        jobs.truncate(limit_of(limit));
        Ok(jobs)
    }

    async fn stats(&self) -> AppResult<JobStats> {
        let mut by_status: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_type: BTreeMap<String, i64> = BTreeMap::new();
        let mut total = 0;
        let mut durations = Vec::new();

        for entry in self.jobs.iter() {
            let job = entry.value();
            total += 1;
            *by_status.entry(job.status.to_string()).or_default() += 1;
            *by_type.entry(job.job_type.to_string()).or_default() += 1;
            if let Some(seconds) = job.processing_seconds() {
                durations.push(seconds);
            }
        }

        let avg_processing_seconds = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Ok(JobStats {
            total,
            by_status,
            by_type,
            avg_processing_seconds,
        })
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut deleted = 0u64;
        self.jobs.retain(|_, job| {
            let finished_at = job.completed_at.unwrap_or(job.updated_at);
            let expired = job.is_terminal() && finished_at < cutoff;
            if expired {
                deleted += 1;
            }
            !expired
        });
        Ok(deleted)
    }

    async fn requeue_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let stale = self.select(
            |job| {
                job.status == JobStatus::Processing
                    && job.claimed_at.is_some_and(|claimed| claimed < claimed_before)
            },
            |job| job.claimed_at,
        );

        Ok(stale
            .into_iter()
            .filter_map(|job| {
                self.compare_and_apply(job.id, &[JobStatus::Processing], &JobChange::requeue(), now)
            })
            .map(|job| job.id)
            .collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
