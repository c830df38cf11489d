//! ClinRec maintenance daemon.
//!
//! Connects to the job store, runs migrations, and keeps the recommendation
//! queue healthy: stale claims are requeued, old terminal jobs are pruned,
//! and queue stats are logged on their cron schedules. Workers run in their
//! own processes against the same store.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use clinrec_core::config::AppConfig;
use clinrec_core::error::AppError;
use clinrec_core::traits::clock::SystemClock;
use clinrec_database::{DatabasePool, JobRepository, JobStore};
use clinrec_worker::{CronScheduler, MaintenanceService};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let base = std::env::var("CLINREC_CONFIG").unwrap_or_else(|_| "config/default".to_string());
    let env = std::env::var("CLINREC_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(&base, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting ClinRec v{}", env!("CARGO_PKG_VERSION"));

    let db = DatabasePool::connect(&config.database).await?;

    if config.database.run_migrations {
        tracing::info!("Running database migrations...");
        clinrec_database::migration::run_migrations(db.pool()).await?;
        tracing::info!("Database migrations complete");
    }

    let store: Arc<dyn JobStore> = Arc::new(JobRepository::new(db.pool().clone()));
    if !store.health_check().await? {
        return Err(AppError::store_unavailable("Job store health check failed"));
    }

    let maintenance = Arc::new(MaintenanceService::new(
        store,
        Arc::new(SystemClock),
        config.queue.clone(),
    ));

    let scheduler = if config.maintenance.enabled {
        let scheduler = CronScheduler::new(Arc::clone(&maintenance)).await?;
        scheduler.register_default_tasks(&config.maintenance).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Scheduled maintenance disabled");
        None
    };

    // Recover anything a previous crash left claimed.
    let report = maintenance.run_maintenance().await;
    tracing::info!(
        requeued = report.requeued.len(),
        deleted = report.deleted,
        "Startup maintenance pass complete"
    );

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    db.close().await;

    tracing::info!("ClinRec shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
