//! CLI command definitions and dispatch.

pub mod job;
pub mod maintenance;
pub mod migrate;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use clinrec_core::config::AppConfig;
use clinrec_core::error::AppError;
use clinrec_core::traits::clock::SystemClock;
use clinrec_database::{DatabasePool, JobRepository, JobStore};
use clinrec_worker::{JobQueue, MaintenanceService};

/// ClinRec recommendation job queue administration
#[derive(Debug, Parser)]
#[command(name = "clinrec", version, about, long_about = None)]
pub struct Cli {
    /// Path to the base configuration file (without extension)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay loaded from `config/{env}.toml`
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Inspect and manage individual jobs
    Job(job::JobArgs),
    /// Show queue statistics
    Stats,
    /// Delete finished jobs past the retention window
    Cleanup(maintenance::CleanupArgs),
    /// Requeue processing jobs whose worker stopped reporting
    Sweep(maintenance::SweepArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load_from(&self.config, &self.env)?;
        let db = DatabasePool::connect(&config.database).await?;

        let ctx = Context::new(&db, &config);

        let result = match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &db).await,
            Commands::Job(args) => job::execute(args, &ctx, self.format).await,
            Commands::Stats => maintenance::stats(&ctx, self.format).await,
            Commands::Cleanup(args) => maintenance::cleanup(args, &ctx).await,
            Commands::Sweep(args) => maintenance::sweep(args, &ctx, self.format).await,
        };

        db.close().await;
        result
    }
}

/// Queue services wired to the PostgreSQL store
#[derive(Debug)]
pub struct Context {
    pub queue: JobQueue,
    pub maintenance: MaintenanceService,
}

impl Context {
    fn new(db: &DatabasePool, config: &AppConfig) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(JobRepository::new(db.pool().clone()));
        let clock = Arc::new(SystemClock);
        Self {
            queue: JobQueue::new(store.clone(), clock.clone(), config.queue.clone()),
            maintenance: MaintenanceService::new(store, clock, config.queue.clone()),
        }
    }
}

/// Ask before a destructive bulk operation unless `--yes` was given
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, AppError> {
    if assume_yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| AppError::internal(format!("Input error: {}", e)))
}
