//! The store handle: an injected, explicitly-opened database.

use crate::backend::{KvBackend, Namespace};
use crate::error::{StoreError, StoreResult};
use crate::file::FileLogBackend;
use crate::memory::MemoryBackend;
use crate::migration::{self, MigrationRunResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the store's log file.
    pub path: PathBuf,
}

impl StoreConfig {
    /// Creates a configuration for a store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// A handle to an open Tidepool store.
///
/// The store owns all physical records; higher layers reach them only
/// through this handle's namespace-scoped operations. The handle is an
/// explicit value passed to its consumers at construction time - there is
/// no process-wide singleton - and has an `open`/`close` lifecycle.
///
/// Cloning is cheap and all clones share the same backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KvBackend>,
    closed: Arc<AtomicBool>,
    migration: MigrationRunResult,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("durable", &self.backend.is_durable())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Store {
    /// Opens a durable store at the configured path.
    ///
    /// Replays the log, then runs any pending schema migrations. Older
    /// schemas are upgraded in place; a newer schema fails with
    /// [`StoreError::SchemaTooNew`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the host environment cannot
    /// provide persistent storage. Callers that must keep working are
    /// expected to fall back to [`Store::open_in_memory`].
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let backend = FileLogBackend::open(&config.path)?;
        Self::with_backend(Arc::new(backend))
    }

    /// Opens a non-durable in-memory store.
    ///
    /// This is the required degraded mode when persistent storage is
    /// unavailable, and the natural backend for tests.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`Store::open`] so
    /// callers can treat both paths uniformly.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Wraps an existing backend, running pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub fn with_backend(backend: Arc<dyn KvBackend>) -> StoreResult<Self> {
        let migration = migration::run_pending(backend.as_ref())?;
        Ok(Self {
            backend,
            closed: Arc::new(AtomicBool::new(false)),
            migration,
        })
    }

    /// Returns true if the backing storage survives process restarts.
    #[must_use]
    pub fn durable(&self) -> bool {
        self.backend.is_durable()
    }

    /// Returns the result of the migration run performed at open.
    #[must_use]
    pub fn migration_result(&self) -> &MigrationRunResult {
        &self.migration
    }

    /// Flushes and closes the store.
    ///
    /// Subsequent operations fail with [`StoreError::Closed`]. Closing an
    /// already-closed store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.flush()
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Stores `value` under `key` in the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the write cannot be persisted.
    pub fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_open()?;
        self.backend.put(ns, key, value)
    }

    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the read fails.
    pub fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        self.backend.get(ns, key)
    }

    /// Removes the entry under `key`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the removal cannot be persisted.
    pub fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool> {
        self.check_open()?;
        self.backend.delete(ns, key)
    }

    /// Returns the number of entries in the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    pub fn count(&self, ns: Namespace) -> StoreResult<usize> {
        self.check_open()?;
        self.backend.count(ns)
    }

    /// Returns a key-ordered snapshot of the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    pub fn iterate(&self, ns: Namespace) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;
        self.backend.iterate(ns)
    }

    /// Removes every entry in the namespace.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the clear cannot be persisted.
    pub fn clear(&self, ns: Namespace) -> StoreResult<()> {
        self.check_open()?;
        self.backend.clear(ns)
    }

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the flush fails.
    pub fn flush(&self) -> StoreResult<()> {
        self.check_open()?;
        self.backend.flush()
    }
}

/// Opens a durable store at `path`, falling back to an in-memory store if
/// persistent storage is unavailable.
///
/// Returns the store; callers can distinguish the degraded mode through
/// [`Store::durable`]. Corruption and migration errors are *not* absorbed -
/// only [`StoreError::Unavailable`] triggers the fallback.
///
/// # Errors
///
/// Returns an error if the durable open fails for any reason other than
/// storage being unavailable.
pub fn open_or_fallback(path: &Path) -> StoreResult<Store> {
    match Store::open(&StoreConfig::new(path)) {
        Ok(store) => Ok(store),
        Err(StoreError::Unavailable { message }) => {
            tracing::warn!(%message, "persistent storage unavailable, running in-memory");
            Store::open_in_memory()
        }
        Err(e) => Err(e),
    }
}
