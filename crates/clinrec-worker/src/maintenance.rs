//! Queue statistics, retention cleanup, and the staleness sweep.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use clinrec_core::config::QueueConfig;
use clinrec_core::error::AppError;
use clinrec_core::result::AppResult;
use clinrec_core::traits::clock::Clock;
use clinrec_database::store::JobStore;
use clinrec_entity::job::JobStats;

/// Aggregation and pruning over the job store.
#[derive(Debug, Clone)]
pub struct MaintenanceService {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

/// Outcome of one [`MaintenanceService::run_maintenance`] pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Stale `processing` jobs returned to `pending`.
    pub requeued: Vec<Uuid>,
    /// Terminal jobs deleted by retention cleanup.
    pub deleted: u64,
    /// Stats snapshot taken after the sweep and cleanup.
    pub stats: Option<JobStats>,
}

impl MaintenanceService {
    /// Create a new maintenance service.
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Totals by status and type plus mean processing time.
    pub async fn get_job_stats(&self) -> AppResult<JobStats> {
        self.store.stats().await
    }

    /// Delete terminal jobs that finished more than `older_than_days` ago.
    ///
    /// Defaults to the configured retention. Pending and processing jobs
    /// are never deleted, whatever their age.
    pub async fn cleanup_old_jobs(&self, older_than_days: Option<i64>) -> AppResult<u64> {
        let days = older_than_days.unwrap_or(self.config.retention_days);
        if days < 0 {
            return Err(AppError::validation(format!(
                "Retention must be zero or more days, got {days}"
            )));
        }

        let cutoff = Duration::try_days(days)
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .ok_or_else(|| AppError::validation(format!("Retention of {days} days is out of range")))?;
        let deleted = self.store.delete_terminal_before(cutoff).await?;
        info!(days, %cutoff, deleted, "Cleaned up old jobs");
        Ok(deleted)
    }

    /// Return `processing` jobs claimed longer than `timeout` ago to `pending`.
    ///
    /// Compensates for workers that crashed between claim and report.
    /// `attempt_count` is left as is; the next claim increments it.
    pub async fn requeue_stale_jobs(&self, timeout: Option<Duration>) -> AppResult<Vec<Uuid>> {
        let timeout = match timeout {
            Some(timeout) => timeout,
            None => i64::try_from(self.config.stale_timeout_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| AppError::configuration("stale_timeout_seconds is out of range"))?,
        };
        if timeout <= Duration::zero() {
            return Err(AppError::validation("Stale timeout must be positive"));
        }

        let now = self.clock.now();
        let claimed_before = now
            .checked_sub_signed(timeout)
            .ok_or_else(|| AppError::validation("Stale timeout is out of range"))?;
        let requeued = self.store.requeue_stale(claimed_before, now).await?;
        if !requeued.is_empty() {
            warn!(
                count = requeued.len(),
                timeout_seconds = timeout.num_seconds(),
                jobs = ?requeued,
                "Requeued stale processing jobs"
            );
        }
        Ok(requeued)
    }

    /// Run the sweep, retention cleanup, and a stats snapshot.
    ///
    /// A failing step is logged and does not stop the remaining steps.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.requeue_stale_jobs(None).await {
            Ok(requeued) => report.requeued = requeued,
            Err(e) => error!(error = %e, "Staleness sweep failed"),
        }
        match self.cleanup_old_jobs(None).await {
            Ok(deleted) => report.deleted = deleted,
            Err(e) => error!(error = %e, "Retention cleanup failed"),
        }
        match self.get_job_stats().await {
            Ok(stats) => {
                log_stats(&stats);
                report.stats = Some(stats);
            }
            Err(e) => error!(error = %e, "Stats snapshot failed"),
        }

        report
    }
}

/// Emit a stats snapshot as a structured event.
pub fn log_stats(stats: &JobStats) {
    info!(
        total = stats.total,
        pending = stats.count_for("pending"),
        processing = stats.count_for("processing"),
        completed = stats.count_for("completed"),
        failed = stats.count_for("failed"),
        cancelled = stats.count_for("cancelled"),
        avg_processing_seconds = ?stats.avg_processing_seconds,
        "Job queue stats"
    );
}
