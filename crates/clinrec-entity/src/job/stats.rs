//! Aggregate queue statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Snapshot of queue health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    /// Total number of jobs in the store.
    pub total: i64,
    /// Job counts keyed by status name.
    pub by_status: BTreeMap<String, i64>,
    /// Job counts keyed by job type name.
    pub by_type: BTreeMap<String, i64>,
    /// Mean `completed_at - started_at` in seconds, over jobs with both set.
    pub avg_processing_seconds: Option<f64>,
}

impl JobStats {
    /// Count for one status, zero when absent.
    pub fn count_for(&self, status: &str) -> i64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}
