//! Kinds of recommendation work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use clinrec_core::error::AppError;

/// The kind of recommendation work a job requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "recommendation_job_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Produce a first recommendation set for a session.
    GenerateRecommendation,
    /// Recompute an existing recommendation set with fresh inputs.
    RefreshRecommendation,
    /// Produce recommendations for several items in one pass.
    BatchRecommendation,
}

impl JobType {
    /// Every job type.
    pub const ALL: [JobType; 3] = [
        Self::GenerateRecommendation,
        Self::RefreshRecommendation,
        Self::BatchRecommendation,
    ];

    /// Return the type as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateRecommendation => "GENERATE_RECOMMENDATION",
            Self::RefreshRecommendation => "REFRESH_RECOMMENDATION",
            Self::BatchRecommendation => "BATCH_RECOMMENDATION",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| AppError::validation(format!("Unknown job type '{s}'")))
    }
}
