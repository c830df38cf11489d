//! Worker-side retry policy.
//!
//! The queue only tracks `attempt_count`; deciding when to stop retrying
//! belongs to the worker.

use serde::{Deserialize, Serialize};

use clinrec_entity::job::RecommendationJob;

use crate::executor::JobExecutionError;

/// When a failed job goes back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Claims after which a job stays `failed`.
    pub max_attempts: i32,
}

impl RetryPolicy {
    /// Create a policy allowing up to `max_attempts` claims.
    pub fn new(max_attempts: i32) -> Self {
        Self { max_attempts }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self { max_attempts: 0 }
    }

    /// Whether `job`, just marked failed with `error`, should be retried.
    pub fn should_retry(&self, job: &RecommendationJob, error: &JobExecutionError) -> bool {
        error.is_transient() && job.can_retry(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
