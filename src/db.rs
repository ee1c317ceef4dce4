use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use tracing::{error, info};

use crate::error::{MigrateError, MigrateResult};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open the existing database at `path` on a single connection. The file is
/// never created here; a missing or unreadable file is a connectivity error.
pub async fn open_pool(path: &Path) -> MigrateResult<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .busy_timeout(BUSY_TIMEOUT)
        .log_statements(log::LevelFilter::Off);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .map_err(|err| {
            error!(
                target: "safekeep",
                event = "db_open_failed",
                path = %path.display(),
                error = %err
            );
            MigrateError::connectivity(err)
        })?;

    // A file that is not a database fails here at the latest.
    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .map_err(MigrateError::connectivity)?;
    let sqlite_version: String = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&pool)
        .await
        .map_err(MigrateError::connectivity)?;

    info!(
        target: "safekeep",
        event = "db_open",
        path = %path.display(),
        sqlite_version = %sqlite_version,
        journal_mode = %journal_mode,
        busy_timeout_ms = BUSY_TIMEOUT.as_millis() as u64
    );
    Ok(pool)
}
