//! Cron scheduler for periodic queue maintenance.

use std::future::Future;
use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use clinrec_core::config::MaintenanceConfig;
use clinrec_core::error::AppError;

use crate::maintenance::{MaintenanceService, log_stats};

/// Runs the staleness sweep, retention cleanup, and stats snapshots on
/// cron schedules.
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    /// Maintenance operations the tasks call into
    maintenance: Arc<MaintenanceService>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(maintenance: Arc<MaintenanceService>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            maintenance,
        })
    }

    /// Register the sweep, cleanup, and stats tasks
    pub async fn register_default_tasks(&self, config: &MaintenanceConfig) -> Result<(), AppError> {
        self.register("stale_sweep", &config.sweep_schedule, |maintenance| async move {
            if let Err(e) = maintenance.requeue_stale_jobs(None).await {
                tracing::error!("Staleness sweep failed: {}", e);
            }
        })
        .await?;

        self.register("retention_cleanup", &config.cleanup_schedule, |maintenance| async move {
            if let Err(e) = maintenance.cleanup_old_jobs(None).await {
                tracing::error!("Retention cleanup failed: {}", e);
            }
        })
        .await?;

        self.register("stats_snapshot", &config.stats_schedule, |maintenance| async move {
            match maintenance.get_job_stats().await {
                Ok(stats) => log_stats(&stats),
                Err(e) => tracing::error!("Stats snapshot failed: {}", e),
            }
        })
        .await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    async fn register<F, Fut>(&self, name: &'static str, schedule: &str, task: F) -> Result<(), AppError>
    where
        F: Fn(Arc<MaintenanceService>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let maintenance = Arc::clone(&self.maintenance);
        let task = Arc::new(task);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let maintenance = Arc::clone(&maintenance);
            let task = Arc::clone(&task);
            Box::pin(async move {
                tracing::debug!("Running scheduled task {}", name);
                task(maintenance).await;
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid schedule '{}' for {}: {}", schedule, name, e))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {} schedule: {}", name, e)))?;

        tracing::info!("Registered: {} ({})", name, schedule);
        Ok(())
    }
}
