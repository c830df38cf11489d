//! Queue accessor configuration.

use serde::{Deserialize, Serialize};

/// Limits and retention applied by the queue accessor and cleanup service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on rows returned by any listing query.
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: i64,
    /// Terminal jobs older than this many days are deleted by cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// A `processing` job claimed longer ago than this is considered stale.
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_seconds: u64,
}

impl QueueConfig {
    /// Clamp a caller-supplied listing limit to `1..=max_list_limit`.
    pub fn clamp_limit(&self, limit: Option<i64>) -> i64 {
        limit
            .unwrap_or(self.max_list_limit)
            .clamp(1, self.max_list_limit.max(1))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_list_limit: default_max_list_limit(),
            retention_days: default_retention_days(),
            stale_timeout_seconds: default_stale_timeout(),
        }
    }
}

fn default_max_list_limit() -> i64 {
    500
}

fn default_retention_days() -> i64 {
    30
}

fn default_stale_timeout() -> u64 {
    900
}
