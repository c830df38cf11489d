//! Recommendation job handler.
//!
//! The queue treats `input_data` and `results` as opaque. This handler
//! unpacks a claimed job into a [`RecommendationRequest`], hands it to a
//! pluggable [`RecommendationEngine`], and returns the engine output as the
//! job results.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use clinrec_entity::job::{JobType, RecommendationJob};

use crate::executor::{JobExecutionError, JobHandler};

/// Everything an engine needs to produce recommendations for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub session_id: String,
    pub patient_id: String,
    pub input: Value,
    /// 1 on the first claim.
    pub attempt: i32,
}

impl RecommendationRequest {
    fn from_job(job: &RecommendationJob) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            session_id: job.session_id.clone(),
            patient_id: job.patient_id.clone(),
            input: job.input_data.clone(),
            attempt: job.attempt_count,
        }
    }
}

/// Produces recommendations. Implementations classify their own failures as
/// transient or permanent.
#[async_trait]
pub trait RecommendationEngine: Send + Sync + std::fmt::Debug {
    async fn generate(&self, request: &RecommendationRequest) -> Result<Value, JobExecutionError>;
}

/// Handles every recommendation job type through one engine
#[derive(Debug)]
pub struct RecommendationHandler<E> {
    engine: Arc<E>,
}

impl<E: RecommendationEngine> RecommendationHandler<E> {
    /// Create a new recommendation handler
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E: RecommendationEngine + 'static> JobHandler for RecommendationHandler<E> {
    fn job_types(&self) -> Vec<JobType> {
        JobType::ALL.to_vec()
    }

    async fn execute(&self, job: &RecommendationJob) -> Result<Value, JobExecutionError> {
        if !(job.input_data.is_object() || job.input_data.is_null()) {
            return Err(JobExecutionError::Permanent(format!(
                "input_data for job {} must be an object",
                job.id
            )));
        }

        let request = RecommendationRequest::from_job(job);
        let results = self.engine.generate(&request).await?;
        if results.is_null() {
            return Err(JobExecutionError::Permanent(format!(
                "Engine returned no results for job {}",
                job.id
            )));
        }

        tracing::debug!(job_id = %job.id, patient_id = %job.patient_id, "Recommendations generated");
        Ok(results)
    }
}
