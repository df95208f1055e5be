//! User identity records keyed by verified address.
//!
//! The identity layer consuming accepted callbacks: maps an address to a
//! persisted user with create-if-absent semantics. Repeated logins by the
//! same address touch `last_login_at` only.

use bitid_auth::Address;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Error type for user storage operations.
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("user storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("user record missing after upsert")]
    Missing,
}

/// A persisted user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub address: String,
    pub created_at: i64,
    pub last_login_at: i64,
}

/// Persistent storage for user identities.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Create the store, creating its table if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                address TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_login_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Fetch or create the user for a verified address.
    pub async fn resolve(&self, address: &Address) -> Result<UserRecord, UserStoreError> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (address, created_at, last_login_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(address) DO UPDATE SET last_login_at = excluded.last_login_at
            "#,
        )
        .bind(address.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(address).await?.ok_or(UserStoreError::Missing)
    }

    /// Look up a user by address.
    pub async fn get(&self, address: &Address) -> Result<Option<UserRecord>, UserStoreError> {
        let row = sqlx::query(
            "SELECT address, created_at, last_login_at FROM users WHERE address = ?1",
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(UserRecord {
                address: row.try_get("address")?,
                created_at: row.try_get("created_at")?,
                last_login_at: row.try_get("last_login_at")?,
            })),
            None => Ok(None),
        }
    }
}
