//! # Tidepool Store
//!
//! Namespaced, schema-versioned embedded key-value store for Tidepool.
//!
//! This crate provides the persistence layer beneath the Tidepool offline
//! engine. Backends are **opaque byte stores**: they map keys to values
//! within a small, fixed set of namespaces and do not interpret record
//! contents. All record interpretation lives in `tidepool_engine`.
//!
//! ## Design Principles
//!
//! - Backends expose a generic ordered key-value contract (`put`, `get`,
//!   `delete`, `count`, `iterate`, `clear`)
//! - Namespaces are independent; clearing one never touches another
//! - Must be `Send + Sync` for shared access through an `Arc`
//! - Durability is the backend's concern; schema versioning is the
//!   [`Store`]'s concern
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and the degraded in-memory fallback
//! - [`FileLogBackend`] - Durable append-only log, replayed on open
//!
//! ## Example
//!
//! ```rust
//! use tidepool_store::{KvBackend, MemoryBackend, Namespace};
//!
//! let backend = MemoryBackend::new();
//! backend.put(Namespace::Meta, b"k", b"v").unwrap();
//! assert_eq!(backend.get(Namespace::Meta, b"k").unwrap(), Some(b"v".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod migration;
mod record;
mod store;

pub use backend::{KvBackend, Namespace};
pub use error::{StoreError, StoreResult};
pub use file::FileLogBackend;
pub use memory::MemoryBackend;
pub use migration::{Migration, MigrationRunResult, CURRENT_SCHEMA_VERSION};
pub use record::{LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use store::{open_or_fallback, Store, StoreConfig};
