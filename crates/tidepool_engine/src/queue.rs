//! Durable FIFO queue of pending mutations.

use crate::action::{ActionId, ActionKind, PendingAction};
use crate::clock::now_ms;
use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tidepool_store::{Namespace, Store};

/// Meta key holding the queue's monotonic sequence counter.
const QUEUE_SEQ_KEY: &[u8] = b"queue_seq";

/// A durable, ordered log of pending mutations.
///
/// Actions are persisted to the store's `PendingActions` namespace before
/// `enqueue` returns, keyed by action id, and are removed only by the sync
/// engine after a confirmed successful replay.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    store: Store,
    seq_guard: Arc<Mutex<()>>,
}

impl ActionQueue {
    /// Creates a queue over the given store handle.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            seq_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Appends a mutation to the queue.
    ///
    /// Generates a fresh id, stamps the current time and the next sequence
    /// number, and persists the record before returning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EnqueueFailed`] if the record could not be
    /// persisted; the caller must treat the mutation as not guaranteed.
    pub fn enqueue(
        &self,
        kind: ActionKind,
        target: impl Into<String>,
        payload: serde_json::Value,
    ) -> EngineResult<PendingAction> {
        let seq = self.next_seq()?;
        let action = PendingAction {
            id: ActionId::new(),
            kind,
            target: target.into(),
            payload,
            enqueued_at: now_ms(),
            seq,
        };

        let bytes = action.encode()?;
        self.store
            .put(Namespace::PendingActions, action.id.as_bytes(), &bytes)
            .map_err(|source| EngineError::EnqueueFailed { source })?;

        tracing::debug!(id = %action.id, kind = %action.kind, target = %action.target, "enqueued action");
        Ok(action)
    }

    /// Returns all pending actions, ascending by `(enqueued_at, seq)`.
    ///
    /// The snapshot is consistent: it reflects only fully-written records.
    /// A record that fails to decode is logged at error level and skipped,
    /// but left in the store - corrupt entries are never silently dropped.
    ///
    /// # Errors
    ///
    /// Fails if the store snapshot cannot be taken.
    pub fn peek_all(&self) -> EngineResult<Vec<PendingAction>> {
        let entries = self.store.iterate(Namespace::PendingActions)?;

        let mut actions = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match PendingAction::decode(&bytes) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    tracing::error!(
                        key = %hex_key(&key),
                        error = %e,
                        "undecodable queue record left in place"
                    );
                }
            }
        }

        actions.sort_by_key(PendingAction::order_key);
        Ok(actions)
    }

    /// Removes an action, returning whether it was present.
    ///
    /// Called by the sync engine after a confirmed successful replay.
    ///
    /// # Errors
    ///
    /// Fails if the removal cannot be persisted.
    pub fn remove(&self, id: ActionId) -> EngineResult<bool> {
        Ok(self.store.delete(Namespace::PendingActions, id.as_bytes())?)
    }

    /// Number of pending actions, including any undecodable records.
    ///
    /// # Errors
    ///
    /// Fails if the store count cannot be taken.
    pub fn len(&self) -> EngineResult<usize> {
        Ok(self.store.count(Namespace::PendingActions)?)
    }

    /// Returns true if no actions are pending.
    ///
    /// # Errors
    ///
    /// Fails if the store count cannot be taken.
    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads, increments and persists the sequence counter.
    ///
    /// The read-modify-write is serialized so concurrent enqueues through
    /// clones of this queue can never share a sequence number.
    fn next_seq(&self) -> EngineResult<u64> {
        let _guard = self.seq_guard.lock();
        let current = match self.store.get(Namespace::Meta, QUEUE_SEQ_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    EngineError::Store(tidepool_store::StoreError::corrupted(
                        "queue sequence counter is malformed",
                    ))
                })?;
                u64::from_le_bytes(arr)
            }
            None => 0,
        };
        let next = current + 1;
        self.store
            .put(Namespace::Meta, QUEUE_SEQ_KEY, &next.to_le_bytes())
            .map_err(|source| EngineError::EnqueueFailed { source })?;
        Ok(next)
    }
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidepool_store::{StoreConfig, StoreError};

    fn queue() -> ActionQueue {
        ActionQueue::new(Store::open_in_memory().unwrap())
    }

    #[test]
    fn enqueue_assigns_increasing_seq() {
        let queue = queue();
        let a = queue
            .enqueue(ActionKind::Insert, "bookings", json!({"id": "b1"}))
            .unwrap();
        let b = queue
            .enqueue(ActionKind::Update, "bookings", json!({"id": "b1"}))
            .unwrap();
        assert!(b.seq > a.seq);
    }

    #[test]
    fn peek_all_returns_enqueue_order() {
        let queue = queue();
        let ids: Vec<_> = (0..5)
            .map(|i| {
                queue
                    .enqueue(ActionKind::Insert, "clients", json!({ "n": i }))
                    .unwrap()
                    .id
            })
            .collect();

        let peeked: Vec<_> = queue.peek_all().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(peeked, ids);
    }

    #[test]
    fn concurrent_enqueues_never_share_a_seq() {
        let queue = queue();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            queue
                                .enqueue(ActionKind::Insert, "bookings", json!({}))
                                .unwrap()
                                .seq
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 100);
    }

    #[test]
    fn remove_deletes_exactly_one() {
        let queue = queue();
        let a = queue
            .enqueue(ActionKind::Insert, "bookings", json!({}))
            .unwrap();
        let b = queue
            .enqueue(ActionKind::Delete, "bookings", json!({}))
            .unwrap();

        assert!(queue.remove(a.id).unwrap());
        assert!(!queue.remove(a.id).unwrap());
        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(queue.peek_all().unwrap()[0].id, b.id);
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.log");

        let id = {
            let store = Store::open(&StoreConfig::new(&path)).unwrap();
            let queue = ActionQueue::new(store.clone());
            let action = queue
                .enqueue(ActionKind::Insert, "bookings", json!({ "id": "b1" }))
                .unwrap();
            store.close().unwrap();
            action.id
        };

        let store = Store::open(&StoreConfig::new(&path)).unwrap();
        let queue = ActionQueue::new(store);
        let pending = queue.peek_all().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[test]
    fn seq_counter_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.log");

        let first_seq = {
            let store = Store::open(&StoreConfig::new(&path)).unwrap();
            let queue = ActionQueue::new(store.clone());
            let action = queue.enqueue(ActionKind::Insert, "t", json!({})).unwrap();
            store.close().unwrap();
            action.seq
        };

        let store = Store::open(&StoreConfig::new(&path)).unwrap();
        let queue = ActionQueue::new(store);
        let action = queue.enqueue(ActionKind::Insert, "t", json!({})).unwrap();
        assert!(action.seq > first_seq);
    }

    #[test]
    fn enqueue_on_closed_store_is_enqueue_failed() {
        let store = Store::open_in_memory().unwrap();
        let queue = ActionQueue::new(store.clone());
        store.close().unwrap();

        let result = queue.enqueue(ActionKind::Insert, "bookings", json!({}));
        assert!(matches!(
            result,
            Err(EngineError::EnqueueFailed {
                source: StoreError::Closed
            })
        ));
    }

    #[test]
    fn corrupt_record_is_skipped_but_kept() {
        let store = Store::open_in_memory().unwrap();
        let queue = ActionQueue::new(store.clone());
        queue
            .enqueue(ActionKind::Insert, "bookings", json!({}))
            .unwrap();
        store
            .put(Namespace::PendingActions, b"junk-key", b"\xff\xffnot cbor")
            .unwrap();

        let pending = queue.peek_all().unwrap();
        assert_eq!(pending.len(), 1);
        // Still physically present and counted
        assert_eq!(queue.len().unwrap(), 2);
    }
}
