//! Recommendation job processing for ClinRec.
//!
//! This crate provides:
//! - [`JobQueue`], the accessor every caller and worker goes through
//! - [`MaintenanceService`] for stats, retention cleanup, and the staleness sweep
//! - A worker runner that claims jobs and reports their outcome
//! - A job executor that dispatches claimed jobs to the right handler
//! - A cron scheduler that runs maintenance periodically

pub mod executor;
pub mod jobs;
pub mod maintenance;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use maintenance::{MaintenanceReport, MaintenanceService};
pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use runner::{JobOutcome, WorkerRunner};
pub use scheduler::CronScheduler;
