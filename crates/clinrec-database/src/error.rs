//! Mapping of `sqlx` failures onto [`AppError`].

use clinrec_core::error::{AppError, ErrorKind};

/// Classify a `sqlx` error. Connectivity failures become
/// [`ErrorKind::StoreUnavailable`]; everything else is [`ErrorKind::Database`].
pub fn map_sqlx(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |err| {
        let kind = match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => ErrorKind::StoreUnavailable,
            _ => ErrorKind::Database,
        };
        AppError::with_source(kind, format!("{context}: {err}"), err)
    }
}
