//! Recommendation job domain entities.

pub mod kind;
pub mod model;
pub mod stats;
pub mod status;

pub use kind::JobType;
pub use model::{CreateRecommendationJob, JobChange, RecommendationJob};
pub use stats::JobStats;
pub use status::{JobPriority, JobStatus};
