//! In-memory nonce store for single-process deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::store::{Nonce, NonceStore, NonceStoreError};

/// How many creations between opportunistic purge sweeps.
const PURGE_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
struct Record {
    session_id: String,
    created_at: DateTime<Utc>,
    consumed: bool,
}

/// Dashmap-backed [`NonceStore`].
///
/// # Properties
///
/// - Atomic consume via the map's entry API (the entry holds a shard lock
///   across the check and the flag flip, so concurrent racers on one id
///   see exactly one winner)
/// - Memory-bounded via `max_entries`; approximate eviction when full
/// - Expired records are denied on lookup and reclaimed opportunistically
///   every [`PURGE_EVERY`] creations, or explicitly via `purge_expired`
pub struct MemoryNonceStore {
    entries: DashMap<String, Record>,
    ttl: Duration,
    max_entries: usize,
    create_counter: AtomicU64,
}

impl MemoryNonceStore {
    /// Create a store with the given validity window and capacity.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(max_entries / 4),
            ttl,
            max_entries,
            create_counter: AtomicU64::new(0),
        }
    }

    /// Current number of live records (including expired-but-unpurged).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let ttl =
            chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::MAX);
        let before = self.entries.len();
        self.entries
            .retain(|_, record| now.signed_duration_since(record.created_at) <= ttl);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn create(&self, session_id: &str) -> Result<Nonce, NonceStoreError> {
        let nonce = Nonce::issue(session_id);
        self.entries.insert(
            nonce.id().to_string(),
            Record {
                session_id: nonce.session_id().to_string(),
                created_at: nonce.created_at(),
                consumed: false,
            },
        );

        let count = self.create_counter.fetch_add(1, Ordering::Relaxed);
        if count % PURGE_EVERY == 0 {
            self.sweep_expired();
        }

        // Evict a single arbitrary entry when at capacity. Approximate, but
        // keeps memory bounded without a global lock.
        if self.entries.len() > self.max_entries {
            let key_to_remove = self
                .entries
                .iter()
                .map(|entry| entry.key().clone())
                .find(|key| key.as_str() != nonce.id());
            if let Some(key) = key_to_remove {
                self.entries.remove(&key);
            }
        }

        Ok(nonce)
    }

    async fn find(&self, id: &str) -> Result<Nonce, NonceStoreError> {
        let record = self
            .entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(NonceStoreError::NotFound)?;

        let nonce = Nonce::from_parts(
            id.to_string(),
            record.session_id,
            record.created_at,
            record.consumed,
        );
        if nonce.is_expired(self.ttl, Utc::now()) {
            return Err(NonceStoreError::Expired);
        }
        Ok(nonce)
    }

    async fn consume(&self, id: &str) -> Result<Nonce, NonceStoreError> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let prior = Nonce::from_parts(
                    id.to_string(),
                    record.session_id.clone(),
                    record.created_at,
                    record.consumed,
                );
                if prior.is_expired(self.ttl, Utc::now()) {
                    return Err(NonceStoreError::Expired);
                }
                if record.consumed {
                    return Err(NonceStoreError::AlreadyConsumed);
                }
                record.consumed = true;
                Ok(prior)
            }
            Entry::Vacant(_) => Err(NonceStoreError::NotFound),
        }
    }

    async fn purge_expired(&self) -> Result<usize, NonceStoreError> {
        Ok(self.sweep_expired())
    }
}
