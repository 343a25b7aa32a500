//! In-memory backend for testing and degraded operation.

use crate::backend::{KvBackend, Namespace};
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type NamespaceMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory key-value backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - The required degraded fallback when persistent storage is unavailable
///
/// Data does not survive process restarts.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: RwLock<BTreeMap<u8, NamespaceMap>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.namespaces
            .write()
            .entry(ns.as_byte())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .read()
            .get(&ns.as_byte())
            .and_then(|m| m.get(key).cloned()))
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool> {
        Ok(self
            .namespaces
            .write()
            .get_mut(&ns.as_byte())
            .is_some_and(|m| m.remove(key).is_some()))
    }

    fn count(&self, ns: Namespace) -> StoreResult<usize> {
        Ok(self
            .namespaces
            .read()
            .get(&ns.as_byte())
            .map_or(0, NamespaceMap::len))
    }

    fn iterate(&self, ns: Namespace) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .namespaces
            .read()
            .get(&ns.as_byte())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn clear(&self, ns: Namespace) -> StoreResult<()> {
        if let Some(m) = self.namespaces.write().get_mut(&ns.as_byte()) {
            m.clear();
        }
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        // Nothing buffered
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
