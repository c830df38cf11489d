//! Built-in job handler implementations.

pub mod recommendation;

pub use recommendation::{RecommendationEngine, RecommendationHandler, RecommendationRequest};
