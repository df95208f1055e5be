//! SQLite-backed nonce persistence.
//!
//! Wraps SQLite access via sqlx. The consume path is a single guarded
//! `UPDATE`, so concurrent callbacks racing on one nonce id resolve to
//! exactly one winner inside the database.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bitid_auth::{Nonce, NonceStore, NonceStoreError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Open or create the service database at the given path.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        // WAL mode for better concurrent read performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync balances durability vs speed
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1) // SQLite performs best with single writer
        .connect_with(options)
        .await
}

/// Persistent [`NonceStore`] with a fixed validity window.
///
/// Timestamps are stored as Unix milliseconds; a record is live while
/// `created_at >= now - ttl` and `consumed_at` is NULL.
#[derive(Clone)]
pub struct SqliteNonceStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteNonceStore {
    /// Create the store, creating its table if needed.
    pub async fn new(pool: SqlitePool, ttl: Duration) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nonces (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                consumed_at INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, ttl })
    }

    /// Oldest creation timestamp (ms) still inside the validity window.
    fn cutoff_ms(&self) -> i64 {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_sub(ttl_ms)
    }
}

fn storage(err: sqlx::Error) -> NonceStoreError {
    NonceStoreError::Storage(err.to_string())
}

#[async_trait]
impl NonceStore for SqliteNonceStore {
    async fn create(&self, session_id: &str) -> Result<Nonce, NonceStoreError> {
        let nonce = Nonce::issue(session_id);

        sqlx::query("INSERT INTO nonces (id, session_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(nonce.id())
            .bind(nonce.session_id())
            .bind(nonce.created_at().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(nonce)
    }

    async fn find(&self, id: &str) -> Result<Nonce, NonceStoreError> {
        let row =
            sqlx::query("SELECT session_id, created_at, consumed_at FROM nonces WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?
                .ok_or(NonceStoreError::NotFound)?;

        let session_id: String = row.try_get("session_id").map_err(storage)?;
        let created_ms: i64 = row.try_get("created_at").map_err(storage)?;
        let consumed_at: Option<i64> = row.try_get("consumed_at").map_err(storage)?;

        if created_ms < self.cutoff_ms() {
            return Err(NonceStoreError::Expired);
        }

        let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
            .ok_or_else(|| NonceStoreError::Storage("corrupt created_at".into()))?;

        Ok(Nonce::from_parts(
            id.to_string(),
            session_id,
            created_at,
            consumed_at.is_some(),
        ))
    }

    async fn consume(&self, id: &str) -> Result<Nonce, NonceStoreError> {
        let prior = self.find(id).await?;
        if prior.is_consumed() {
            return Err(NonceStoreError::AlreadyConsumed);
        }

        // The guarded UPDATE is the gate; the read above only shapes the
        // returned record and the error.
        let result = sqlx::query(
            "UPDATE nonces
             SET consumed_at = ?1
             WHERE id = ?2 AND consumed_at IS NULL AND created_at >= ?3",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .bind(self.cutoff_ms())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            // Another caller won between the read and the update, or the
            // window closed in between.
            return Err(match self.find(id).await {
                Ok(_) => NonceStoreError::AlreadyConsumed,
                Err(err) => err,
            });
        }

        Ok(prior)
    }

    async fn purge_expired(&self) -> Result<usize, NonceStoreError> {
        let result = sqlx::query("DELETE FROM nonces WHERE created_at < ?1")
            .bind(self.cutoff_ms())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected() as usize)
    }
}
