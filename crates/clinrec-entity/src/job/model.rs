//! Recommendation job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::kind::JobType;
use super::status::{JobPriority, JobStatus};

/// One unit of asynchronous recommendation work for a session and patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecommendationJob {
    /// Unique job identifier.
    pub id: Uuid,
    /// Clinical session that requested the job.
    pub session_id: String,
    /// Patient the recommendation concerns.
    pub patient_id: String,
    /// Kind of recommendation work.
    pub job_type: JobType,
    /// Claim urgency.
    pub priority: JobPriority,
    /// Current job status.
    pub status: JobStatus,
    /// Opaque payload handed to the worker unmodified.
    pub input_data: serde_json::Value,
    /// Opaque payload written on successful completion.
    pub results: Option<serde_json::Value>,
    /// Last failure reason; present only while `failed`.
    pub error_message: Option<String>,
    /// Number of times the job has been claimed.
    pub attempt_count: i32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last written.
    pub updated_at: DateTime<Utc>,
    /// First claim time.
    pub started_at: Option<DateTime<Utc>>,
    /// Most recent claim time; cleared when the job returns to `pending`.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the job entered a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecommendationJob {
    /// Build a fresh `pending` job from validated creation data.
    pub fn new(data: CreateRecommendationJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: data.session_id,
            patient_id: data.patient_id,
            job_type: data.job_type,
            priority: data.priority,
            status: JobStatus::Pending,
            input_data: data.input_data,
            results: None,
            error_message: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            claimed_at: None,
            completed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the caller-side retry policy allows another attempt.
    pub fn can_retry(&self, max_attempts: i32) -> bool {
        self.status.can_retry() && self.attempt_count < max_attempts
    }

    /// Processing duration in seconds, when the job has both timestamps.
    pub fn processing_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Apply a status change in place.
    ///
    /// This does not check the state machine; stores call it only after the
    /// compare-and-swap on the current status succeeded.
    pub fn apply(&mut self, change: &JobChange, now: DateTime<Utc>) {
        self.status = change.status;
        self.updated_at = now;
        self.error_message = None;
        self.results = None;

        match change.status {
            JobStatus::Processing => {
                self.attempt_count += 1;
                self.started_at.get_or_insert(now);
                self.claimed_at = Some(now);
                self.completed_at = None;
            }
            JobStatus::Pending => {
                self.claimed_at = None;
                self.completed_at = None;
            }
            JobStatus::Completed => {
                self.results = change.results.clone();
                self.completed_at = Some(now);
            }
            JobStatus::Failed => {
                self.error_message = change.error_message.clone();
                self.completed_at = Some(now);
            }
            JobStatus::Cancelled => {
                self.completed_at = Some(now);
            }
        }
    }
}

/// A requested status change and the payload that accompanies it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobChange {
    /// Target status.
    pub status: JobStatus,
    /// Failure reason, used only when `status` is `failed`.
    pub error_message: Option<String>,
    /// Results, used only when `status` is `completed`.
    pub results: Option<serde_json::Value>,
    /// Claim token. When set, the change applies only while the row's
    /// `attempt_count` still equals it.
    pub attempt: Option<i32>,
}

impl JobChange {
    /// Claim for processing.
    pub fn claim() -> Self {
        Self::to(JobStatus::Processing)
    }

    /// Complete with results.
    pub fn complete(results: serde_json::Value) -> Self {
        Self {
            results: Some(results),
            ..Self::to(JobStatus::Completed)
        }
    }

    /// Fail with a reason.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::to(JobStatus::Failed)
        }
    }

    /// Cancel.
    pub fn cancel() -> Self {
        Self::to(JobStatus::Cancelled)
    }

    /// Back to `pending` (explicit retry or staleness sweep).
    pub fn requeue() -> Self {
        Self::to(JobStatus::Pending)
    }

    /// Restrict the change to the claim that produced `attempt`.
    pub fn for_attempt(mut self, attempt: i32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Whether `job` is still held by the claim this change was made for.
    pub fn matches_claim(&self, job: &RecommendationJob) -> bool {
        self.attempt.is_none_or(|attempt| job.attempt_count == attempt)
    }

    fn to(status: JobStatus) -> Self {
        Self {
            status,
            error_message: None,
            results: None,
            attempt: None,
        }
    }
}

/// Data required to create a new recommendation job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRecommendationJob {
    /// Requesting clinical session.
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "session_id is required"))]
    pub session_id: String,
    /// Patient the recommendation concerns.
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "patient_id is required"))]
    pub patient_id: String,
    /// Kind of recommendation work.
    pub job_type: JobType,
    /// Claim urgency.
    #[serde(default)]
    pub priority: JobPriority,
    /// Opaque worker input.
    #[serde(default)]
    pub input_data: serde_json::Value,
}

impl CreateRecommendationJob {
    /// Creation data with default priority and an empty payload.
    pub fn new(
        session_id: impl Into<String>,
        patient_id: impl Into<String>,
        job_type: JobType,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            patient_id: patient_id.into(),
            job_type,
            priority: JobPriority::default(),
            input_data: serde_json::Value::Null,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the worker input payload.
    pub fn with_input(mut self, input_data: serde_json::Value) -> Self {
        self.input_data = input_data;
        self
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
