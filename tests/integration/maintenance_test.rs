//! Integration tests for retention cleanup, stats, and the staleness sweep.

mod helpers;

use chrono::Duration;
use serde_json::json;

use clinrec_core::error::ErrorKind;
use clinrec_entity::job::{JobPriority, JobStatus};

#[tokio::test]
async fn test_cleanup_thirty_days() {
    let app = helpers::TestQueue::new();

    let stuck = app.enqueue("s1", JobPriority::Normal).await;
    app.queue.get_next_pending_job().await.unwrap().unwrap();

    app.clock.advance(Duration::days(29));
    let done = app.enqueue("s1", JobPriority::Normal).await;
    app.queue.get_next_pending_job().await.unwrap().unwrap();
    app.queue.update_job_results(done.id, json!({ "items": [] })).await.unwrap();

    // `done` finished 31 days ago, `stuck` was created 60 days ago.
    app.clock.advance(Duration::days(31));

    assert_eq!(app.maintenance.cleanup_old_jobs(Some(30)).await.unwrap(), 1);
    assert!(app.queue.get_job_by_id(done.id).await.unwrap().is_none());
    let stuck = app.queue.get_job_by_id(stuck.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, JobStatus::Processing);
}

#[tokio::test]
async fn test_cleanup_defaults_to_configured_retention() {
    let app = helpers::TestQueue::new();
    let cancelled = app.enqueue("s1", JobPriority::Low).await;
    app.queue.cancel_job(cancelled.id).await.unwrap();

    app.clock.advance(Duration::days(29));
    assert_eq!(app.maintenance.cleanup_old_jobs(None).await.unwrap(), 0);

    app.clock.advance(Duration::days(2));
    assert_eq!(app.maintenance.cleanup_old_jobs(None).await.unwrap(), 1);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_sweep_then_reclaim_increments_attempts() {
    let app = helpers::TestQueue::new();
    let job = app.enqueue("s1", JobPriority::High).await;
    let first = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(first.attempt_count, 1);

    // Default stale timeout is 15 minutes.
    app.clock.advance(Duration::minutes(16));
    let requeued = app.maintenance.requeue_stale_jobs(None).await.unwrap();
    assert_eq!(requeued, vec![job.id]);

    // The crashed worker's late report is rejected.
    assert!(app.queue.update_job_results(job.id, json!({})).await.is_err());

    let second = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(second.id, job.id);
    assert_eq!(second.attempt_count, 2);
    assert_eq!(second.started_at, first.started_at);
}

#[tokio::test]
async fn test_report_from_swept_claim_does_not_override_new_claim() {
    let app = helpers::TestQueue::new();
    let job = app.enqueue("s1", JobPriority::Normal).await;
    let worker_a = app.queue.get_next_pending_job().await.unwrap().unwrap();

    app.clock.advance(Duration::minutes(30));
    assert_eq!(app.maintenance.requeue_stale_jobs(None).await.unwrap(), vec![job.id]);
    let worker_b = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(worker_b.attempt_count, 2);

    let err = app
        .queue
        .complete_claimed_job(&worker_a, json!({ "from": "a" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
    let err = app
        .queue
        .fail_claimed_job(&worker_a, "worker a timed out")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);

    let done = app
        .queue
        .complete_claimed_job(&worker_b, json!({ "from": "b" }))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.results, Some(json!({ "from": "b" })));
    assert_eq!(done.attempt_count, 2);
}

#[tokio::test]
async fn test_stats_reflect_lifecycle() {
    let app = helpers::TestQueue::new();
    for _ in 0..3 {
        app.enqueue("s1", JobPriority::Normal).await;
    }
    let job = app.queue.get_next_pending_job().await.unwrap().unwrap();
    app.clock.advance(Duration::seconds(10));
    app.queue.update_job_results(job.id, json!({})).await.unwrap();

    let cancelled = app.queue.get_job_queue(None).await.unwrap()[0].id;
    app.queue.cancel_job(cancelled).await.unwrap();

    let stats = app.maintenance.get_job_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.count_for("pending"), 1);
    assert_eq!(stats.count_for("completed"), 1);
    assert_eq!(stats.count_for("cancelled"), 1);
    assert_eq!(stats.count_for("failed"), 0);
    assert_eq!(stats.avg_processing_seconds, Some(10.0));
}
