//! # clinrec-entity
//!
//! Domain entity models for the recommendation job queue. Every struct in
//! this crate represents a database table row or a domain value object.
//! Database entities additionally derive `sqlx::FromRow`.

pub mod job;

pub use job::{
    CreateRecommendationJob, JobChange, JobPriority, JobStats, JobStatus, JobType,
    RecommendationJob,
};
