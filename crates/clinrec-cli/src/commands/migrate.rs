//! Database migration management commands.

use clap::{Args, Subcommand};

use crate::output;
use clinrec_core::error::AppError;
use clinrec_database::DatabasePool;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check that the database is reachable
    Check,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, db: &DatabasePool) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            clinrec_database::migration::run_migrations(db.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Check => {
            ping(db).await?;
            output::print_success("Database is reachable.");
        }
    }

    Ok(())
}

async fn ping(db: &DatabasePool) -> Result<(), AppError> {
    use clinrec_database::{JobRepository, JobStore};

    let repo = JobRepository::new(db.pool().clone());
    if repo.health_check().await? {
        Ok(())
    } else {
        Err(AppError::store_unavailable("Database health check returned an unexpected value"))
    }
}
