//! TTL-annotated read-through cache.

use crate::clock::now_ms;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tidepool_store::{Namespace, Store};

/// A persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: Value,
    /// Write wall clock time, milliseconds since the Unix epoch.
    stored_at: u64,
    /// Absolute expiry, milliseconds since the Unix epoch.
    expires_at: u64,
}

/// Key-addressed cache with per-entry expiry.
///
/// The cache is a non-authoritative optimization: every failure is absorbed
/// locally. Reads degrade to absent and writes to no-ops, with a warning
/// logged, so callers never have to handle cache errors.
///
/// Expiry is enforced lazily on access - an entry observed past its
/// `expires_at` is treated as absent and physically deleted. Callers that
/// accumulate many entries can run [`CacheStore::purge_expired`]
/// periodically.
#[derive(Debug, Clone)]
pub struct CacheStore {
    store: Store,
}

impl CacheStore {
    /// Creates a cache over the given store handle.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Stores `value` under `key` with the given time-to-live.
    ///
    /// Overwrites any existing entry for the same key; last writer wins.
    /// Failures are absorbed and logged.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = now_ms();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        };

        let mut buf = Vec::new();
        if let Err(e) = ciborium::into_writer(&entry, &mut buf) {
            tracing::warn!(key, error = %e, "cache write skipped: encode failed");
            return;
        }
        if let Err(e) = self.store.put(Namespace::CachedEntries, key.as_bytes(), &buf) {
            tracing::warn!(key, error = %e, "cache write skipped: store failed");
        }
    }

    /// Reads the entry under `key`, deserialized as `T`.
    ///
    /// Returns `None` for missing entries, expired entries (which are
    /// deleted on the spot), and any read or decode failure.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(Namespace::CachedEntries, key.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read degraded to absent");
                return None;
            }
        };

        let entry: CacheEntry = match ciborium::from_reader(bytes.as_slice()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache entry undecodable, dropping");
                self.delete_quietly(key);
                return None;
            }
        };

        if entry.expires_at <= now_ms() {
            self.delete_quietly(key);
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value does not match requested type");
                None
            }
        }
    }

    /// Empties the cache.
    ///
    /// Touches only the cache namespace; the action queue is unaffected.
    /// Failures are absorbed and logged.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear(Namespace::CachedEntries) {
            tracing::warn!(error = %e, "cache clear failed");
        }
    }

    /// Deletes every entry past its expiry, returning how many were removed.
    ///
    /// Complements the lazy per-read expiry for callers that cache many
    /// keys and read few of them.
    pub fn purge_expired(&self) -> usize {
        let entries = match self.store.iterate(Namespace::CachedEntries) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "cache purge skipped");
                return 0;
            }
        };

        let now = now_ms();
        let mut removed = 0usize;
        for (key, bytes) in entries {
            let expired = match ciborium::from_reader::<CacheEntry, _>(bytes.as_slice()) {
                Ok(entry) => entry.expires_at <= now,
                // Undecodable cache entries are disposable
                Err(_) => true,
            };
            if expired && self.store.delete(Namespace::CachedEntries, &key).unwrap_or(false) {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        removed
    }

    /// Number of physically present entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.count(Namespace::CachedEntries).unwrap_or(0)
    }

    /// Returns true if no entries are physically present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.store.delete(Namespace::CachedEntries, key.as_bytes()) {
            tracing::warn!(key, error = %e, "expired cache entry could not be deleted");
        }
    }
}
