use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::StoreError;

/// Opens (creating if necessary) the embedded store file and returns a pool.
///
/// WAL journaling lets read-side consumers query while the engine writes;
/// `synchronous=FULL` makes a returned commit mean bytes-on-disk, which the
/// engine's write-before-acknowledge contract depends on.
pub async fn connect(path: &str) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| sqlx::Error::Io(std::io::Error::other(e)))?;
        }
    }

    let options = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// An in-memory store for backtests and tests.
///
/// Pinned to a single never-recycled connection: every pooled connection to
/// `:memory:` would otherwise see its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}
