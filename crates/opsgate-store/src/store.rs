//! Store handle: connection management and schema application.

use opsgate_audit::HistorySigner;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::schema::SCHEMA;

/// Handle to the opsgate database.
///
/// Cloneable; all clones share one pool and one signer.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) signer: HistorySigner,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the file cannot be opened
    /// or a schema statement fails.
    pub async fn open(path: impl AsRef<Path>, signer: HistorySigner) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let store = Self { pool, signer };
        store.apply_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    ///
    /// A single pooled connection keeps the database alive for the
    /// pool's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] on failure.
    pub async fn in_memory(signer: HistorySigner) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let store = Self { pool, signer };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Connection(format!("schema: {e}")))?;
        }
        tracing::debug!(statements = SCHEMA.len(), "schema applied");
        Ok(())
    }

    /// The signer used for history entries.
    #[must_use]
    pub fn signer(&self) -> &HistorySigner {
        &self.signer
    }

    /// Direct access to the underlying pool, for ad-hoc queries where
    /// the typed API is not sufficient.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
