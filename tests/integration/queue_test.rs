//! Integration tests for claiming and the job lifecycle.

mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;

use clinrec_core::error::ErrorKind;
use clinrec_entity::job::{CreateRecommendationJob, JobPriority, JobStatus, JobType};

#[tokio::test]
async fn test_create_claim_complete() {
    let app = helpers::TestQueue::new();
    let data = CreateRecommendationJob::new("s1", "p1", JobType::GenerateRecommendation)
        .with_priority(JobPriority::High)
        .with_input(json!({ "symptoms": ["fever"] }));

    let created = app.queue.create_job(data).await.unwrap();
    assert_eq!(created.status, JobStatus::Pending);
    assert_eq!(created.attempt_count, 0);
    assert!(created.results.is_none());
    assert!(created.error_message.is_none());

    let claimed = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(claimed.id, created.id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.attempt_count, 1);

    let items = json!({ "items": ["rest", "fluids"] });
    app.queue.update_job_results(created.id, items.clone()).await.unwrap();

    let stored = app.queue.get_job_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.results, Some(items));
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.input_data, json!({ "symptoms": ["fever"] }));
}

#[tokio::test]
async fn test_urgent_claimed_before_older_low() {
    let app = helpers::TestQueue::new();
    let low = app.enqueue("s1", JobPriority::Low).await;
    app.clock.advance(chrono::Duration::seconds(1));
    let urgent = app.enqueue("s1", JobPriority::Urgent).await;

    let first = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(first.id, urgent.id);
    let second = app.queue.get_next_pending_job().await.unwrap().unwrap();
    assert_eq!(second.id, low.id);
    assert!(app.queue.get_next_pending_job().await.unwrap().is_none());
}

#[tokio::test]
async fn test_fail_then_retry_keeps_attempt_count() {
    let app = helpers::TestQueue::new();
    let job = app.enqueue("s1", JobPriority::Normal).await;
    app.queue.get_next_pending_job().await.unwrap().unwrap();

    let failed = app
        .queue
        .update_job_status(job.id, JobStatus::Failed, Some("timeout".into()))
        .await
        .unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("timeout"));

    let retried = app.queue.retry_failed_job(job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.error_message.is_none());
    assert_eq!(retried.attempt_count, failed.attempt_count);
}

#[tokio::test]
async fn test_terminal_states_are_write_once() {
    let app = helpers::TestQueue::new();
    let job = app.enqueue("s1", JobPriority::Normal).await;
    app.queue.get_next_pending_job().await.unwrap().unwrap();
    app.queue
        .update_job_results(job.id, json!({ "items": [] }))
        .await
        .unwrap();

    let err = app
        .queue
        .update_job_status(job.id, JobStatus::Failed, Some("late failure".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);

    let err = app
        .queue
        .update_job_results(job.id, json!({ "items": ["other"] }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);

    assert!(!app.queue.cancel_job(job.id).await.unwrap());
    let stored = app.queue.get_job_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.results, Some(json!({ "items": [] })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_single_pending_job_has_exactly_one_claimant() {
    for _ in 0..20 {
        let app = helpers::TestQueue::new();
        let job = app.enqueue("s1", JobPriority::Normal).await;

        let claims = join_all((0..16).map(|_| {
            let queue = Arc::clone(&app.queue);
            tokio::spawn(async move { queue.get_next_pending_job().await })
        }))
        .await;

        let winners: Vec<_> = claims
            .into_iter()
            .filter_map(|joined| joined.unwrap().unwrap())
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, job.id);
        assert_eq!(winners[0].attempt_count, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_workers_never_claim_a_job_twice() {
    let app = helpers::TestQueue::new();
    let mut created = HashSet::new();
    for i in 0..200 {
        let priority = match i % 4 {
            0 => JobPriority::Low,
            1 => JobPriority::Normal,
            2 => JobPriority::High,
            _ => JobPriority::Urgent,
        };
        created.insert(app.enqueue("s1", priority).await.id);
    }

    let workers = (0..8).map(|_| {
        let queue = Arc::clone(&app.queue);
        tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.get_next_pending_job().await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        })
    });

    let mut seen = HashSet::new();
    for claimed in join_all(workers).await {
        for id in claimed.unwrap() {
            assert!(seen.insert(id), "job {id} claimed twice");
        }
    }
    assert_eq!(seen, created);
}

#[tokio::test]
async fn test_cancel_session_leaves_finished_jobs() {
    let app = helpers::TestQueue::new();
    let done = app.enqueue("s1", JobPriority::Urgent).await;
    app.queue.get_next_pending_job().await.unwrap();
    app.queue.update_job_results(done.id, json!({})).await.unwrap();

    let running = app.enqueue("s1", JobPriority::High).await;
    app.queue.get_next_pending_job().await.unwrap();
    let waiting = app.enqueue("s1", JobPriority::Normal).await;
    let other = app.enqueue("s2", JobPriority::Normal).await;

    assert_eq!(app.queue.cancel_jobs_by_session("s1").await.unwrap(), 2);

    let status = |id: uuid::Uuid| {
        let queue = Arc::clone(&app.queue);
        async move { queue.get_job_by_id(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(done.id).await, JobStatus::Completed);
    assert_eq!(status(running.id).await, JobStatus::Cancelled);
    assert_eq!(status(waiting.id).await, JobStatus::Cancelled);
    assert_eq!(status(other.id).await, JobStatus::Pending);

    // A worker still holding the cancelled job cannot complete it.
    let err = app
        .queue
        .update_job_results(running.id, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
}
