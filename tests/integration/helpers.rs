//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use clinrec_core::config::{DatabaseConfig, QueueConfig};
use clinrec_core::traits::clock::ManualClock;
use clinrec_database::{DatabasePool, JobRepository, JobStore, MemoryJobStore};
use clinrec_entity::job::{CreateRecommendationJob, JobPriority, JobType, RecommendationJob};
use clinrec_worker::{JobQueue, MaintenanceService};

/// Queue, maintenance service and clock sharing one in-memory store
pub struct TestQueue {
    pub queue: Arc<JobQueue>,
    pub maintenance: MaintenanceService,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryJobStore>,
}

impl TestQueue {
    /// Create a fresh in-memory queue
    pub fn new() -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        Self::with_store(store.clone(), store, clock)
    }

    fn with_store(
        dyn_store: Arc<dyn JobStore>,
        store: Arc<MemoryJobStore>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let config = QueueConfig::default();
        Self {
            queue: Arc::new(JobQueue::new(dyn_store.clone(), clock.clone(), config.clone())),
            maintenance: MaintenanceService::new(dyn_store, clock.clone(), config),
            clock,
            store,
        }
    }

    /// Enqueue a job with the given priority
    pub async fn enqueue(&self, session: &str, priority: JobPriority) -> RecommendationJob {
        self.enqueue_with(session, priority, Value::Null).await
    }

    /// Enqueue a job with the given priority and input
    pub async fn enqueue_with(
        &self,
        session: &str,
        priority: JobPriority,
        input: Value,
    ) -> RecommendationJob {
        let data = CreateRecommendationJob::new(session, "p1", JobType::GenerateRecommendation)
            .with_priority(priority)
            .with_input(input);
        self.queue.create_job(data).await.expect("Failed to create job")
    }
}

/// Connect to the PostgreSQL database named by `CLINREC_TEST_DATABASE_URL`
/// and empty the jobs table.
///
/// Returns `None` when the variable is unset so the PostgreSQL tests are
/// skipped on machines without a database.
pub async fn pg_store() -> Option<Arc<JobRepository>> {
    let url = std::env::var("CLINREC_TEST_DATABASE_URL").ok()?;
    let db = DatabasePool::connect(&DatabaseConfig::new(url))
        .await
        .expect("Failed to connect to test database");
    clinrec_database::migration::run_migrations(db.pool())
        .await
        .expect("Failed to run migrations");
    sqlx::query("TRUNCATE recommendation_jobs")
        .execute(db.pool())
        .await
        .expect("Failed to clean jobs table");
    Some(Arc::new(JobRepository::new(db.into_pool())))
}
