//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use clinrec_core::result::AppResult;
use clinrec_entity::job::{JobChange, JobStats, JobStatus, RecommendationJob};

use crate::error::map_sqlx;
use crate::store::JobStore;

/// Column list for `recommendation_jobs` queries.
const COLUMNS: &str = "\
    id, session_id, patient_id, job_type, priority, status, \
    input_data, results, error_message, attempt_count, \
    created_at, updated_at, started_at, claimed_at, completed_at";

/// Repository for recommendation job persistence and queue operations.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, job: &RecommendationJob) -> AppResult<RecommendationJob> {
        let query = format!(
            "INSERT INTO recommendation_jobs \
             (id, session_id, patient_id, job_type, priority, status, input_data, \
              attempt_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(job.id)
            .bind(&job.session_id)
            .bind(&job.patient_id)
            .bind(job.job_type)
            .bind(job.priority)
            .bind(job.status)
            .bind(&job.input_data)
            .bind(job.attempt_count)
            .bind(job.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx("Failed to create job"))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RecommendationJob>> {
        let query = format!("SELECT {COLUMNS} FROM recommendation_jobs WHERE id = $1");
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx("Failed to find job"))
    }

    async fn find_by_session(
        &self,
        session_id: &str,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>> {
        let query = format!(
            "SELECT {COLUMNS} FROM recommendation_jobs \
             WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx("Failed to list session jobs"))
    }

    async fn find_by_patient(
        &self,
        patient_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> AppResult<Vec<RecommendationJob>> {
        let query = format!(
            "SELECT {COLUMNS} FROM recommendation_jobs \
             WHERE patient_id = $1 AND ($2::recommendation_job_status IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(patient_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx("Failed to list patient jobs"))
    }

    /// Claims with a single conditional UPDATE. `SKIP LOCKED` keeps
    /// concurrent claimants off rows another transaction is examining, and
    /// the outer `status = 'pending'` guard makes the update a no-op if the
    /// row changed in between.
    async fn claim_next(&self, now: DateTime<Utc>) -> AppResult<Option<RecommendationJob>> {
        let query = format!(
            "UPDATE recommendation_jobs SET \
                status = 'processing', \
                attempt_count = attempt_count + 1, \
                started_at = COALESCE(started_at, $1), \
                claimed_at = $1, \
                completed_at = NULL, \
                error_message = NULL, \
                results = NULL, \
                updated_at = $1 \
             WHERE id = ( \
                SELECT id FROM recommendation_jobs \
                WHERE status = 'pending' \
                ORDER BY priority DESC, created_at ASC, id ASC \
                LIMIT 1 \
                FOR UPDATE SKIP LOCKED \
             ) AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx("Failed to claim job"))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[JobStatus],
        change: &JobChange,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RecommendationJob>> {
        let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "UPDATE recommendation_jobs SET \
                status = $3, \
                error_message = CASE WHEN $3 = 'failed' THEN $4 ELSE NULL END, \
                results = CASE WHEN $3 = 'completed' THEN $5 ELSE NULL END, \
                attempt_count = attempt_count + CASE WHEN $3 = 'processing' THEN 1 ELSE 0 END, \
                started_at = CASE WHEN $3 = 'processing' THEN COALESCE(started_at, $6) ELSE started_at END, \
                claimed_at = CASE WHEN $3 = 'processing' THEN $6 \
                                  WHEN $3 = 'pending' THEN NULL \
                                  ELSE claimed_at END, \
                completed_at = CASE WHEN $3 IN ('completed', 'failed', 'cancelled') THEN $6 ELSE NULL END, \
                updated_at = $6 \
             WHERE id = $1 AND status::text = ANY($2::text[]) \
               AND ($7::int4 IS NULL OR attempt_count = $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(id)
            .bind(&expected)
            .bind(change.status)
            .bind(change.error_message.as_deref())
            .bind(change.results.as_ref())
            .bind(now)
            .bind(change.attempt)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx("Failed to update job status"))
    }

    async fn cancel_by_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE recommendation_jobs SET \
                status = 'cancelled', error_message = NULL, results = NULL, \
                completed_at = $2, updated_at = $2 \
             WHERE session_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx("Failed to cancel session jobs"))?;
        Ok(result.rows_affected())
    }

    async fn pending(&self, limit: i64) -> AppResult<Vec<RecommendationJob>> {
        let query = format!(
            "SELECT {COLUMNS} FROM recommendation_jobs \
             WHERE status = 'pending' \
             ORDER BY priority DESC, created_at ASC, id ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, RecommendationJob>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx("Failed to list pending jobs"))
    }

    async fn stats(&self) -> AppResult<JobStats> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status::text, COUNT(*) FROM recommendation_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx("Failed to count jobs by status"))?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT job_type::text, COUNT(*) FROM recommendation_jobs GROUP BY job_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx("Failed to count jobs by type"))?;

        let avg_processing_seconds: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(EXTRACT(EPOCH FROM (completed_at - started_at)))::float8 \
             FROM recommendation_jobs \
             WHERE started_at IS NOT NULL AND completed_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx("Failed to average processing time"))?;

        Ok(JobStats {
            total: by_status.iter().map(|(_, count)| count).sum(),
            by_status: by_status.into_iter().collect(),
            by_type: by_type.into_iter().collect(),
            avg_processing_seconds,
        })
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM recommendation_jobs \
             WHERE status IN ('completed', 'failed', 'cancelled') \
             AND COALESCE(completed_at, updated_at) < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx("Failed to cleanup jobs"))?;
        Ok(result.rows_affected())
    }

    async fn requeue_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar(
            "UPDATE recommendation_jobs SET \
                status = 'pending', claimed_at = NULL, updated_at = $2 \
             WHERE status = 'processing' AND claimed_at < $1 \
             RETURNING id",
        )
        .bind(claimed_before)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx("Failed to requeue stale jobs"))
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(map_sqlx("Health check failed"))
    }
}
