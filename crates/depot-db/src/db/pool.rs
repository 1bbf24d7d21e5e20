use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Schema for the `uploads` and `statistics` tables, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Open a SQLite pool for `database_url`, creating the database file if needed.
///
/// WAL journaling lets readers proceed while a writer holds the lock; writers
/// queue on the busy timeout instead of failing with `SQLITE_BUSY`.
pub async fn connect_pool(
    database_url: &str,
    max_connections: u32,
    timeout: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await
}
