//! Schema migrations for the `recommendation_jobs` table.

use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use tracing::info;

use clinrec_core::error::{AppError, ErrorKind};
use clinrec_core::result::AppResult;

use crate::error::map_sqlx;

/// Apply every migration under `migrations/` that the store has not seen.
///
/// A store that cannot be reached surfaces as `StoreUnavailable`; checksum
/// and version mismatches are `Database`.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(classify)?;

    info!("Job store schema is up to date");
    Ok(())
}

fn classify(err: MigrateError) -> AppError {
    match err {
        MigrateError::Execute(e) => map_sqlx("Failed to apply migration")(e),
        other => AppError::with_source(
            ErrorKind::Database,
            format!("Migration history does not match: {other}"),
            other,
        ),
    }
}
