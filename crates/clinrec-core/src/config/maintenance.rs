//! Scheduled maintenance configuration.

use serde::{Deserialize, Serialize};

/// Cron schedules for the staleness sweep, retention cleanup, and stats
/// snapshot. Expressions use the six-field `sec min hour dom mon dow` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Whether scheduled maintenance runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Staleness sweep schedule.
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,
    /// Retention cleanup schedule.
    #[serde(default = "default_cleanup_schedule")]
    pub cleanup_schedule: String,
    /// Stats snapshot schedule.
    #[serde(default = "default_stats_schedule")]
    pub stats_schedule: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sweep_schedule: default_sweep_schedule(),
            cleanup_schedule: default_cleanup_schedule(),
            stats_schedule: default_stats_schedule(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_schedule() -> String {
    "0 */5 * * * *".to_string()
}

fn default_cleanup_schedule() -> String {
    "0 30 3 * * *".to_string()
}

fn default_stats_schedule() -> String {
    "0 */15 * * * *".to_string()
}
