//! Persistent dedup log of completed downloads.
//!
//! One row per successfully completed whole-file download, keyed logically
//! by (archive identifier, filename). The log is append-only: rows are never
//! updated or deleted, and a key may appear more than once when a file was
//! removed locally and fetched again. Lookups return the most recent row;
//! callers are responsible for re-validating that the recorded file still
//! exists (the store does not self-heal stale rows).
//!
//! Writes are serialized by the SQLite connection (WAL journal plus busy
//! timeout, see [`crate::db`]); reads may run concurrently with writes and
//! never observe partial rows.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;

use crate::db::Database;

/// Errors from dedup store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database operation failed.
    #[error("dedup store query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// One completed-download row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DownloadRecord {
    pub id: i64,
    pub identifier: String,
    pub filename: String,
    pub local_path: String,
    pub completed_at: String,
}

/// Append-only (identifier, filename) → local path store.
#[derive(Debug, Clone)]
pub struct DedupStore {
    db: Database,
}

impl DedupStore {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the most recently recorded local path for the key, or `None`
    /// when the key was never recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn lookup(
        &self,
        identifier: &str,
        filename: &str,
    ) -> Result<Option<PathBuf>, StoreError> {
        let path: Option<String> = sqlx::query_scalar(
            r"SELECT local_path FROM downloads
              WHERE identifier = ? AND filename = ?
              ORDER BY id DESC LIMIT 1",
        )
        .bind(identifier)
        .bind(filename)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(path.map(PathBuf::from))
    }

    /// Appends a completed-download row and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self), fields(local_path = %local_path.display()))]
    pub async fn insert(
        &self,
        identifier: &str,
        filename: &str,
        local_path: &Path,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r"INSERT INTO downloads (identifier, filename, local_path)
              VALUES (?, ?, ?)",
        )
        .bind(identifier)
        .bind(filename)
        .bind(local_path.to_string_lossy().into_owned())
        .execute(self.db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Number of rows recorded for the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count(&self, identifier: &str, filename: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM downloads WHERE identifier = ? AND filename = ?",
        )
        .bind(identifier)
        .bind(filename)
        .fetch_one(self.db.pool())
        .await?;

        Ok(count)
    }
}
