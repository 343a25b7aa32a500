//! Remote collaborator abstraction for action replay.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Result type for remote dispatches.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by the remote collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The network layer failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether a later attempt could succeed.
        retryable: bool,
    },

    /// The remote system rejected the mutation.
    ///
    /// Rejections are permanent from the remote's point of view; the action
    /// still stays queued (see the engine's retry policy).
    #[error("remote rejected mutation: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Rejected(_) => false,
        }
    }
}

/// The remote mutation-capable backend the engine replays against.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP API client, mock for testing, etc.). The engine
/// consumes it purely through the insert/update/delete contract; the record
/// id a mutation targets travels inside the payload.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Creates a record in the target collection.
    async fn insert(&self, target: &str, payload: &Value) -> RemoteResult<()>;

    /// Partially updates the record identified by the id in the payload.
    async fn update(&self, target: &str, payload: &Value) -> RemoteResult<()>;

    /// Removes the record identified by the id in the payload.
    async fn delete(&self, target: &str, payload: &Value) -> RemoteResult<()>;
}

/// A recorded dispatch made against [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDispatch {
    /// Operation name: `insert`, `update` or `delete`.
    pub op: &'static str,
    /// Target collection.
    pub target: String,
    /// Payload as sent.
    pub payload: Value,
}

/// A mock remote backend for testing.
///
/// Records every dispatch in order, and can be told to fail specific
/// targets or to delay each call (for re-entrancy tests).
#[derive(Debug, Default)]
pub struct MockRemote {
    dispatches: Mutex<Vec<RecordedDispatch>>,
    fail_targets: Mutex<HashSet<String>>,
    fail_payload_ids: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    /// Creates a new mock remote that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every dispatch against `target` fail.
    pub fn fail_target(&self, target: impl Into<String>) {
        self.fail_targets.lock().insert(target.into());
    }

    /// Stops failing dispatches against `target`.
    pub fn heal_target(&self, target: &str) {
        self.fail_targets.lock().remove(target);
    }

    /// Makes dispatches fail when the payload's `id` field equals `id`.
    pub fn fail_payload_id(&self, id: impl Into<String>) {
        self.fail_payload_ids.lock().insert(id.into());
    }

    /// Delays every dispatch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Returns all dispatches recorded so far, in order.
    #[must_use]
    pub fn dispatches(&self) -> Vec<RecordedDispatch> {
        self.dispatches.lock().clone()
    }

    /// Number of dispatches recorded so far.
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().len()
    }

    async fn dispatch(&self, op: &'static str, target: &str, payload: &Value) -> RemoteResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.dispatches.lock().push(RecordedDispatch {
            op,
            target: target.to_string(),
            payload: payload.clone(),
        });

        if self.fail_targets.lock().contains(target) {
            return Err(RemoteError::transport_retryable(format!(
                "target {target} unreachable"
            )));
        }

        if let Some(id) = payload.get("id").and_then(Value::as_str) {
            if self.fail_payload_ids.lock().contains(id) {
                return Err(RemoteError::Rejected(format!("record {id} is invalid")));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MockRemote {
    async fn insert(&self, target: &str, payload: &Value) -> RemoteResult<()> {
        self.dispatch("insert", target, payload).await
    }

    async fn update(&self, target: &str, payload: &Value) -> RemoteResult<()> {
        self.dispatch("update", target, payload).await
    }

    async fn delete(&self, target: &str, payload: &Value) -> RemoteResult<()> {
        self.dispatch("delete", target, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retryable_classification() {
        assert!(RemoteError::transport_retryable("offline").is_retryable());
        assert!(!RemoteError::transport_fatal("bad certificate").is_retryable());
        assert!(!RemoteError::Rejected("validation".into()).is_retryable());
    }

    #[tokio::test]
    async fn mock_records_dispatch_order() {
        let remote = MockRemote::new();
        remote.insert("bookings", &json!({ "id": "b1" })).await.unwrap();
        remote.update("bookings", &json!({ "id": "b1" })).await.unwrap();
        remote.delete("clients", &json!({ "id": "c1" })).await.unwrap();

        let ops: Vec<_> = remote.dispatches().iter().map(|d| d.op).collect();
        assert_eq!(ops, vec!["insert", "update", "delete"]);
    }

    #[tokio::test]
    async fn mock_fails_configured_target() {
        let remote = MockRemote::new();
        remote.fail_target("bookings");

        let result = remote.insert("bookings", &json!({})).await;
        assert!(matches!(result, Err(RemoteError::Transport { .. })));

        remote.heal_target("bookings");
        remote.insert("bookings", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn mock_fails_configured_payload_id() {
        let remote = MockRemote::new();
        remote.fail_payload_id("b2");

        remote.insert("bookings", &json!({ "id": "b1" })).await.unwrap();
        let result = remote.insert("bookings", &json!({ "id": "b2" })).await;
        assert!(matches!(result, Err(RemoteError::Rejected(_))));
    }
}
