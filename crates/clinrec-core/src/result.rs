//! Convenience result type alias for ClinRec.

use crate::error::AppError;

/// A specialized `Result` type for queue operations.
pub type AppResult<T> = Result<T, AppError>;
