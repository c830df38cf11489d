//! Stats, retention cleanup, and staleness sweep commands.

use chrono::Duration;
use clap::Args;

use super::{Context, confirm};
use crate::output::{self, OutputFormat};
use clinrec_core::error::AppError;

/// Arguments for the cleanup command
#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Delete jobs finished more than this many days ago (defaults to
    /// `queue.retention_days`)
    #[arg(long)]
    pub days: Option<i64>,
    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for the sweep command
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Requeue jobs claimed longer ago than this (defaults to
    /// `queue.stale_timeout_seconds`)
    #[arg(long)]
    pub timeout_seconds: Option<i64>,
}

/// Print queue statistics
pub async fn stats(ctx: &Context, format: OutputFormat) -> Result<(), AppError> {
    let stats = ctx.maintenance.get_job_stats().await?;
    output::print_stats(&stats, format);
    Ok(())
}

/// Delete old terminal jobs
pub async fn cleanup(args: &CleanupArgs, ctx: &Context) -> Result<(), AppError> {
    let window = args
        .days
        .map_or_else(|| "the configured retention".to_string(), |d| format!("{} days", d));
    let prompt = format!("Permanently delete finished jobs older than {}?", window);
    if !confirm(&prompt, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let deleted = ctx.maintenance.cleanup_old_jobs(args.days).await?;
    output::print_success(&format!("{} job(s) deleted.", deleted));
    Ok(())
}

/// Requeue stale processing jobs
pub async fn sweep(args: &SweepArgs, ctx: &Context, format: OutputFormat) -> Result<(), AppError> {
    let timeout = args
        .timeout_seconds
        .map(|secs| {
            Duration::try_seconds(secs)
                .ok_or_else(|| AppError::validation(format!("Timeout of {} seconds is out of range", secs)))
        })
        .transpose()?;

    let requeued = ctx.maintenance.requeue_stale_jobs(timeout).await?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&requeued).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
        OutputFormat::Table => {
            for id in &requeued {
                output::print_kv("requeued", &id.to_string());
            }
            output::print_success(&format!("{} stale job(s) requeued.", requeued.len()));
        }
    }
    Ok(())
}
