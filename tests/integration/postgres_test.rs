//! PostgreSQL store tests.
//!
//! Skipped unless `CLINREC_TEST_DATABASE_URL` points at a scratch database.
//! Everything runs in one test because each run truncates the jobs table.

mod helpers;

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde_json::json;

use clinrec_core::error::ErrorKind;
use clinrec_core::traits::clock::ManualClock;
use clinrec_database::JobStore;
use clinrec_entity::job::{CreateRecommendationJob, JobPriority, JobStatus, JobType};
use clinrec_worker::{JobQueue, MaintenanceService};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_job_store() {
    let Some(repo) = helpers::pg_store().await else {
        eprintln!("CLINREC_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let store: Arc<dyn JobStore> = repo;
    assert!(store.health_check().await.unwrap());

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let config = clinrec_core::config::QueueConfig::default();
    let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), config.clone()));
    let maintenance = MaintenanceService::new(store.clone(), clock.clone(), config);

    let create = |priority| {
        CreateRecommendationJob::new("pg-session", "pg-patient", JobType::GenerateRecommendation)
            .with_priority(priority)
            .with_input(json!({ "k": 1 }))
    };

    // Priority then FIFO ordering.
    let low = queue.create_job(create(JobPriority::Low)).await.unwrap();
    clock.advance(Duration::seconds(1));
    let urgent = queue.create_job(create(JobPriority::Urgent)).await.unwrap();
    let listed: Vec<_> = queue.get_job_queue(None).await.unwrap().iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![urgent.id, low.id]);

    // Exactly one of many concurrent claimants wins each job.
    let claims = join_all((0..10).map(|_| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.get_next_pending_job().await })
    }))
    .await;
    let mut winners: Vec<_> = claims
        .into_iter()
        .filter_map(|joined| joined.unwrap().unwrap())
        .collect();
    winners.sort_by_key(|job| std::cmp::Reverse(job.priority.numeric_priority()));
    assert_eq!(winners.len(), 2);
    assert_eq!(winners[0].id, urgent.id);
    assert_eq!(winners[1].id, low.id);
    assert!(winners.iter().all(|job| job.attempt_count == 1));

    // Complete one, fail and retry the other.
    clock.advance(Duration::seconds(4));
    let done = queue
        .update_job_results(urgent.id, json!({ "items": ["a"] }))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.results, Some(json!({ "items": ["a"] })));

    let err = queue
        .update_job_status(urgent.id, JobStatus::Failed, Some("late".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);

    queue
        .update_job_status(low.id, JobStatus::Failed, Some("timeout".into()))
        .await
        .unwrap();
    let retried = queue.retry_failed_job(low.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.error_message.is_none());
    assert_eq!(retried.attempt_count, 1);

    // Stale claims are swept back to pending; the old claim can no longer report.
    let stale_claim = queue.get_next_pending_job().await.unwrap().unwrap();
    clock.advance(Duration::hours(1));
    let requeued = maintenance.requeue_stale_jobs(None).await.unwrap();
    assert_eq!(requeued, vec![low.id]);
    let reclaimed = queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(reclaimed.attempt_count, stale_claim.attempt_count + 1);
    let err = queue
        .complete_claimed_job(&stale_claim, json!({ "from": "stale" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);

    let stats = maintenance.get_job_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.count_for("completed"), 1);
    assert_eq!(stats.count_for("processing"), 1);
    assert_eq!(stats.avg_processing_seconds, Some(4.0));

    let patient_jobs = queue
        .get_jobs_by_patient("pg-patient", Some(JobStatus::Completed), None)
        .await
        .unwrap();
    assert_eq!(patient_jobs.len(), 1);
    assert_eq!(queue.get_jobs_by_session("pg-session").await.unwrap().len(), 2);

    // Retention: the completed job is 31 days old, the processing one is kept.
    clock.advance(Duration::days(31));
    assert_eq!(maintenance.cleanup_old_jobs(Some(30)).await.unwrap(), 1);
    assert_eq!(queue.cancel_jobs_by_session("pg-session").await.unwrap(), 1);
}
