use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::error::StorageError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sent_alerts (
    id TEXT PRIMARY KEY,
    date_sent TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRecord {
    pub identifier: String,
    pub first_seen: DateTime<Utc>,
}

/// Durable ledger of entry identifiers that have already been announced.
///
/// Records are insert-only; nothing here updates or prunes them.
#[derive(Debug, Clone)]
pub struct SeenStore {
    pool: SqlitePool,
}

impl SeenStore {
    /// Open (creating if needed) the database file at `path` and ensure the
    /// schema exists. Failure here is an environment problem the caller
    /// should treat as fatal.
    pub async fn initialize(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        info!(path = %path.display(), "seen store ready");
        Ok(store)
    }

    /// A private in-memory database, mostly for tests. A single connection
    /// is kept alive for the life of the pool since each SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Storage errors read as "not seen".
    pub async fn is_seen(&self, identifier: &str) -> bool {
        let row: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT 1 FROM sent_alerts WHERE id = ?")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await;
        match row {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(entry = %identifier, error = %err, "failed to query seen store");
                false
            }
        }
    }

    /// Idempotent: marking an already-seen identifier is a no-op.
    pub async fn mark_seen(&self, identifier: &str) -> Result<(), StorageError> {
        let result = sqlx::query("INSERT OR IGNORE INTO sent_alerts (id) VALUES (?)")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!(entry = %identifier, "entry already marked as seen");
        }
        Ok(())
    }

    pub async fn record(&self, identifier: &str) -> Result<Option<SeenRecord>, StorageError> {
        let row: Option<(String, NaiveDateTime)> =
            sqlx::query_as("SELECT id, date_sent FROM sent_alerts WHERE id = ?")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(identifier, date_sent)| SeenRecord {
            identifier,
            first_seen: date_sent.and_utc(),
        }))
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM sent_alerts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
