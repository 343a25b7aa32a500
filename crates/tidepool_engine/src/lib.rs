//! # Tidepool Engine
//!
//! Offline-first mutation queue and local cache engine.
//!
//! The engine lets a client keep mutating while disconnected and reconciles
//! with the remote system once connectivity returns. It provides:
//!
//! - A durable FIFO queue of pending mutations, replayed in enqueue order
//! - A TTL-annotated read-through cache with lazy expiry
//! - A connectivity monitor that triggers synchronization on reconnect
//! - A status read model (queue depth, last sync, in-flight state)
//!
//! Persistence comes from [`tidepool_store`]; when no persistent storage is
//! available the engine degrades to in-memory operation instead of failing.
//!
//! ## Guarantees
//!
//! - An enqueued action is persisted before `enqueue_action` returns, and is
//!   removed only after the remote collaborator confirms its replay
//! - Within a sync pass, actions are dispatched strictly in enqueue order
//! - A failed action never blocks the replay of later, independent actions
//! - Concurrent sync triggers collapse into a single active pass
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidepool_engine::{ActionKind, EngineConfig, MockRemote, OfflineEngine};
//!
//! # async fn demo() -> tidepool_engine::EngineResult<()> {
//! let remote = Arc::new(MockRemote::new());
//! let engine = Arc::new(OfflineEngine::open(EngineConfig::default(), remote)?);
//!
//! engine.enqueue_action(
//!     ActionKind::Insert,
//!     "bookings",
//!     serde_json::json!({ "id": "b1", "name": "Alice" }),
//! )?;
//! engine.sync_pending_actions().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod cache;
mod clock;
mod config;
mod connectivity;
mod engine;
mod error;
mod queue;
mod remote;
mod status;

pub use action::{ActionId, ActionKind, PendingAction};
pub use cache::CacheStore;
pub use config::EngineConfig;
pub use connectivity::{ConnectivityMonitor, Transition};
pub use engine::{OfflineEngine, SyncReport};
pub use error::{EngineError, EngineResult};
pub use queue::ActionQueue;
pub use remote::{MockRemote, RecordedDispatch, RemoteBackend, RemoteError, RemoteResult};
pub use status::{StatusReporter, SyncStatus};
