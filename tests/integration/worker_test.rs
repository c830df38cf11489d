//! End-to-end tests for the worker loop against the in-memory store.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::watch;

use clinrec_core::config::WorkerConfig;
use clinrec_entity::job::{JobPriority, JobStatus, RecommendationJob};
use clinrec_worker::jobs::{RecommendationEngine, RecommendationHandler, RecommendationRequest};
use clinrec_worker::{JobExecutionError, JobExecutor, WorkerRunner};

/// Fails attempts up to the job's `flaky_attempts` input, then succeeds.
#[derive(Debug, Default)]
struct FakeEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl RecommendationEngine for FakeEngine {
    async fn generate(&self, request: &RecommendationRequest) -> Result<Value, JobExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let flaky = request
            .input
            .get("flaky_attempts")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if i64::from(request.attempt) <= flaky {
            return Err(JobExecutionError::Transient("engine overloaded".into()));
        }
        Ok(json!({ "patient": request.patient_id, "items": ["follow-up"] }))
    }
}

fn worker(app: &helpers::TestQueue, engine: Arc<FakeEngine>, id: &str) -> WorkerRunner {
    let mut executor = JobExecutor::new();
    executor.register(Arc::new(RecommendationHandler::new(engine)));
    let config = WorkerConfig {
        concurrency: 3,
        poll_interval_ms: 5,
        max_backoff_ms: 25,
        max_attempts: 3,
        ..WorkerConfig::default()
    };
    WorkerRunner::new(Arc::clone(&app.queue), Arc::new(executor), config, id)
}

async fn wait_for<F>(app: &helpers::TestQueue, ids: &[uuid::Uuid], done: F)
where
    F: Fn(&RecommendationJob) -> bool,
{
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let mut all = true;
            for id in ids {
                let job = app.queue.get_job_by_id(*id).await.unwrap().unwrap();
                all &= done(&job);
            }
            if all {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "jobs did not reach the expected state in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_workers_process_every_job_once() {
    let app = helpers::TestQueue::new();
    let engine = Arc::new(FakeEngine::default());

    let mut ids = Vec::new();
    for _ in 0..30 {
        ids.push(app.enqueue_with("s1", JobPriority::Normal, json!({})).await.id);
    }

    let (tx, rx) = watch::channel(false);
    let handles: Vec<_> = ["worker-a", "worker-b"]
        .into_iter()
        .map(|id| {
            let runner = worker(&app, Arc::clone(&engine), id);
            let rx = rx.clone();
            tokio::spawn(async move { runner.run(rx).await })
        })
        .collect();

    wait_for(&app, &ids, |job| job.status == JobStatus::Completed).await;
    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(engine.calls.load(Ordering::SeqCst), ids.len());
    for id in &ids {
        let job = app.queue.get_job_by_id(*id).await.unwrap().unwrap();
        assert_eq!(job.attempt_count, 1);
        assert_eq!(
            job.results,
            Some(json!({ "patient": "p1", "items": ["follow-up"] }))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transient_failures_retry_up_to_max_attempts() {
    let app = helpers::TestQueue::new();
    let engine = Arc::new(FakeEngine::default());

    let recovers = app
        .enqueue_with("s1", JobPriority::High, json!({ "flaky_attempts": 2 }))
        .await;
    let gives_up = app
        .enqueue_with("s1", JobPriority::High, json!({ "flaky_attempts": 5 }))
        .await;

    let (tx, rx) = watch::channel(false);
    let runner = worker(&app, Arc::clone(&engine), "worker-retry");
    let handle = tokio::spawn(async move { runner.run(rx).await });

    // A retried job is briefly `failed`, so only the last attempt counts.
    wait_for(&app, &[recovers.id, gives_up.id], |job| {
        job.status == JobStatus::Completed
            || (job.status == JobStatus::Failed && job.attempt_count >= 3)
    })
    .await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let recovered = app.queue.get_job_by_id(recovers.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, JobStatus::Completed);
    assert_eq!(recovered.attempt_count, 3);

    let failed = app.queue.get_job_by_id(gives_up.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempt_count, 3);
    assert_eq!(failed.error_message.as_deref(), Some("engine overloaded"));
}

#[tokio::test]
async fn test_worker_stops_when_sender_dropped() {
    let app = helpers::TestQueue::new();
    let runner = worker(&app, Arc::new(FakeEngine::default()), "worker-idle");
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
