//! Pending action records and their persisted encoding.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tidepool_store::StoreError;
use uuid::Uuid;

/// Opaque unique identifier of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the id as bytes, used as the store key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of mutation a queued action carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a new record in the target collection.
    Insert,
    /// Partially update a record identified by the id in the payload.
    Update,
    /// Remove a record identified by the id in the payload.
    Delete,
}

impl ActionKind {
    /// Returns the kind as a static string, for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued mutation awaiting replay against the remote collaborator.
///
/// Once persisted an action is immutable until removed, and it is removed
/// only after a confirmed successful replay.
///
/// Replay order is ascending `(enqueued_at, seq)`: `enqueued_at` is wall
/// clock milliseconds, `seq` a store-wide monotonic counter that breaks
/// same-millisecond ties so the order is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique identifier; also the store key.
    pub id: ActionId,
    /// Mutation kind.
    pub kind: ActionKind,
    /// Name of the logical collection the mutation targets.
    pub target: String,
    /// Arbitrary structured record accompanying the mutation.
    pub payload: serde_json::Value,
    /// Enqueue wall clock time, milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    /// Store-wide enqueue sequence number.
    pub seq: u64,
}

impl PendingAction {
    /// Encodes the action as canonical CBOR for persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| EngineError::Store(StoreError::codec(e.to_string())))?;
        Ok(buf)
    }

    /// Decodes an action from its persisted CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid action record.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| EngineError::Store(StoreError::codec(e.to_string())))
    }

    /// The key this action sorts by during replay.
    #[must_use]
    pub fn order_key(&self) -> (u64, u64) {
        (self.enqueued_at, self.seq)
    }
}
