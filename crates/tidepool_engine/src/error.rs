//! Error types for the offline engine.

use crate::action::ActionId;
use thiserror::Error;
use tidepool_store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the offline engine.
///
/// Queue-integrity errors always propagate to the caller: silently losing a
/// user mutation is unacceptable. Cache failures are never represented here
/// because the cache layer absorbs them (reads degrade to absent, writes to
/// no-ops).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Writing an action to the queue failed.
    ///
    /// The mutation is *not* guaranteed to be persisted; the caller may
    /// retry or surface the failure to the user.
    #[error("failed to enqueue action: {source}")]
    EnqueueFailed {
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },

    /// Remote dispatch of one queued action failed.
    ///
    /// The action stays queued and is retried on the next sync trigger.
    #[error("replay failed for action {id}: {message}")]
    ReplayFailed {
        /// The action whose dispatch failed.
        id: ActionId,
        /// Description of the failure.
        message: String,
    },

    /// A store operation outside the enqueue path failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Creates a replay failure for the given action.
    pub fn replay_failed(id: ActionId, message: impl Into<String>) -> Self {
        Self::ReplayFailed {
            id,
            message: message.into(),
        }
    }
}
