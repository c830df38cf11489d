//! Job inspection and management commands.

use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{Context, confirm};
use crate::output::{self, OutputFormat};
use clinrec_core::error::AppError;
use clinrec_entity::job::{CreateRecommendationJob, JobPriority, JobStatus, JobType};

/// Arguments for the job command
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Enqueue a new recommendation job
    Create {
        /// Requesting session
        #[arg(long)]
        session: String,
        /// Patient the recommendation concerns
        #[arg(long)]
        patient: String,
        /// Job type (e.g. GENERATE_RECOMMENDATION)
        #[arg(long = "type", value_parser = parse_type)]
        job_type: JobType,
        /// Priority (LOW, NORMAL, HIGH, URGENT)
        #[arg(long, value_parser = parse_priority, default_value = "NORMAL")]
        priority: JobPriority,
        /// Worker input as a JSON document
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Show one job
    Get {
        /// Job ID
        id: Uuid,
    },
    /// List a session's jobs, newest first
    ListSession {
        /// Session ID
        session: String,
    },
    /// List a patient's jobs, newest first
    ListPatient {
        /// Patient ID
        patient: String,
        /// Only jobs in this status
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        /// Maximum number of jobs
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show pending jobs in claim order
    Queue {
        /// Maximum number of jobs
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Cancel a pending or processing job
    Cancel {
        /// Job ID
        id: Uuid,
    },
    /// Cancel every active job of a session
    CancelSession {
        /// Session ID
        session: String,
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Return a failed job to the queue
    Retry {
        /// Job ID
        id: Uuid,
    },
    /// Mark a processing job failed
    Fail {
        /// Job ID
        id: Uuid,
        /// Failure reason
        #[arg(long)]
        message: String,
    },
}

/// Execute job commands
pub async fn execute(args: &JobArgs, ctx: &Context, format: OutputFormat) -> Result<(), AppError> {
    let queue = &ctx.queue;

    match &args.command {
        JobCommand::Create {
            session,
            patient,
            job_type,
            priority,
            input,
        } => {
            let input_data: serde_json::Value = serde_json::from_str(input)
                .map_err(|e| AppError::validation(format!("--input is not valid JSON: {}", e)))?;
            let data = CreateRecommendationJob::new(session.as_str(), patient.as_str(), *job_type)
                .with_priority(*priority)
                .with_input(input_data);
            let job = queue.create_job(data).await?;
            output::print_job(&job, format);
        }
        JobCommand::Get { id } => match queue.get_job_by_id(*id).await? {
            Some(job) => output::print_job(&job, format),
            None => return Err(AppError::not_found(format!("Job {} not found", id))),
        },
        JobCommand::ListSession { session } => {
            let jobs = queue.get_jobs_by_session(session).await?;
            output::print_jobs(&jobs, format);
        }
        JobCommand::ListPatient {
            patient,
            status,
            limit,
        } => {
            let jobs = queue.get_jobs_by_patient(patient, *status, *limit).await?;
            output::print_jobs(&jobs, format);
        }
        JobCommand::Queue { limit } => {
            let jobs = queue.get_job_queue(*limit).await?;
            output::print_jobs(&jobs, format);
        }
        JobCommand::Cancel { id } => {
            if queue.cancel_job(*id).await? {
                output::print_success(&format!("Job {} cancelled.", id));
            } else {
                output::print_warning(&format!("Job {} had already finished.", id));
            }
        }
        JobCommand::CancelSession { session, yes } => {
            let prompt = format!("Cancel all pending and processing jobs of session '{}'?", session);
            if !confirm(&prompt, *yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            let count = queue.cancel_jobs_by_session(session).await?;
            output::print_success(&format!("{} job(s) cancelled.", count));
        }
        JobCommand::Retry { id } => {
            let job = queue.retry_failed_job(*id).await?;
            output::print_job(&job, format);
        }
        JobCommand::Fail { id, message } => {
            let job = queue
                .update_job_status(*id, JobStatus::Failed, Some(message.clone()))
                .await?;
            output::print_job(&job, format);
        }
    }

    Ok(())
}

fn parse_type(value: &str) -> Result<JobType, String> {
    value.parse().map_err(|e: AppError| e.to_string())
}

fn parse_priority(value: &str) -> Result<JobPriority, String> {
    value.parse().map_err(|e: AppError| e.to_string())
}

fn parse_status(value: &str) -> Result<JobStatus, String> {
    value.parse().map_err(|e: AppError| e.to_string())
}
