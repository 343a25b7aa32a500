//! Key-value backend trait and namespace definitions.

use crate::error::StoreResult;

/// A logical record collection within the store.
///
/// Namespaces are independent: clearing or iterating one never observes
/// another. The set is closed because the engine's persisted layout is fixed
/// (a mutation queue, a TTL cache, and store metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Namespace {
    /// Store metadata: schema version, queue sequence counter.
    Meta = 0,
    /// Durable log of pending mutations, keyed by action id.
    PendingActions = 1,
    /// TTL-annotated cache entries, keyed by cache key.
    CachedEntries = 2,
}

impl Namespace {
    /// Converts a byte to a namespace.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Meta),
            1 => Some(Self::PendingActions),
            2 => Some(Self::CachedEntries),
            _ => None,
        }
    }

    /// Converts the namespace to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// All namespaces, in tag order.
    pub const ALL: [Namespace; 3] = [
        Namespace::Meta,
        Namespace::PendingActions,
        Namespace::CachedEntries,
    ];
}

/// A namespaced key-value backend for the Tidepool store.
///
/// Backends are **opaque byte stores**: they do not interpret keys or values.
/// The engine owns all record interpretation.
///
/// # Invariants
///
/// - `put` followed by `get` of the same key returns the stored value
/// - `iterate` returns a consistent snapshot ordered ascending by key
/// - `clear` affects only the given namespace
/// - After `flush` returns, all prior writes are as durable as the backend
///   can make them
/// - Backends must be `Send + Sync` for shared access through an `Arc`
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For testing and degraded operation
/// - [`super::FileLogBackend`] - For persistent storage
pub trait KvBackend: Send + Sync {
    /// Stores `value` under `key`, overwriting any existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be persisted.
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Removes the entry under `key`.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool>;

    /// Returns the number of entries in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the count cannot be determined.
    fn count(&self, ns: Namespace) -> StoreResult<usize>;

    /// Returns a snapshot of all entries in the namespace, ordered
    /// ascending by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be taken.
    fn iterate(&self, ns: Namespace) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Removes every entry in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the clear cannot be persisted.
    fn clear(&self, ns: Namespace) -> StoreResult<()>;

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StoreResult<()>;

    /// Returns true if this backend survives process restarts.
    fn is_durable(&self) -> bool;
}
