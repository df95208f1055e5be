//! Nonce entity and the storage trait hosting services implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// A single-use challenge nonce bound to the session that requested it.
///
/// Lifecycle: `Created → Consumed` (terminal) or `Created → Expired`
/// (terminal, time-based). Both terminal states make the nonce permanently
/// unusable. The session binding is set at creation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    id: String,
    session_id: String,
    created_at: DateTime<Utc>,
    consumed: bool,
}

impl Nonce {
    /// Issue a fresh nonce for a session.
    ///
    /// The id is an opaque 128-bit random token (lowercase hex); the
    /// creation timestamp is captured from the wall clock here, not at
    /// request arrival, so expiry is independent of processing order.
    #[must_use]
    pub fn issue(session_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            consumed: false,
        }
    }

    /// Rehydrate a record from a backing store.
    ///
    /// For store implementations only; the invariants above are the
    /// store's to uphold.
    #[must_use]
    pub fn from_parts(
        id: String,
        session_id: String,
        created_at: DateTime<Utc>,
        consumed: bool,
    ) -> Self {
        Self {
            id,
            session_id,
            created_at,
            consumed,
        }
    }

    /// The opaque correlation handle embedded in challenge URIs.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session this nonce was issued to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wall-clock creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the nonce has been consumed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Whether the nonce is past its validity window at `now`.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX);
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// Errors from nonce storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NonceStoreError {
    /// No record exists (or it has been evicted).
    #[error("challenge not found")]
    NotFound,

    /// The record was already consumed.
    #[error("challenge already consumed")]
    AlreadyConsumed,

    /// The record is past its validity window.
    #[error("challenge expired")]
    Expired,

    /// The backing store is unavailable. Fatal to the current request,
    /// never attributed to the caller.
    #[error("nonce storage unavailable: {0}")]
    Storage(String),
}

/// Persistence contract for single-use nonces.
///
/// # Thread Safety
///
/// Uses `&self` throughout; implementations must be `Send + Sync` and safe
/// under concurrent invocation from simultaneous requests.
///
/// # Atomicity
///
/// `consume` **MUST be atomic**: two callers racing on the same id must see
/// exactly one success, the loser gets `AlreadyConsumed` (or `Expired`).
/// Use an entry-level lock, a compare-and-swap, or a guarded transactional
/// update; a separate check-then-set creates a TOCTOU window that defeats
/// replay prevention.
///
/// # Expiry
///
/// Implementations carry a validity window (TTL) fixed at construction.
/// Expiry is computed against the record's creation timestamp and enforced
/// lazily on `find`/`consume`; `purge_expired` reclaims storage but is not
/// required for correctness.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Generate and persist a fresh nonce bound to `session_id`.
    ///
    /// The returned id has never been issued by this store before.
    async fn create(&self, session_id: &str) -> Result<Nonce, NonceStoreError>;

    /// Retrieve a nonce by id without mutating state.
    ///
    /// A consumed nonce is still returned; consumption is re-checked
    /// atomically at `consume` time, which is the single source of truth
    /// for replay decisions.
    async fn find(&self, id: &str) -> Result<Nonce, NonceStoreError>;

    /// Atomically transition the nonce from unconsumed to consumed.
    ///
    /// Returns the record as it stood immediately before the transition.
    async fn consume(&self, id: &str) -> Result<Nonce, NonceStoreError>;

    /// Evict expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, NonceStoreError>;
}
