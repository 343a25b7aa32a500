//! Sync status read model.

use parking_lot::RwLock;
use serde::Serialize;

/// A point-in-time view of the engine's sync state.
///
/// Derived and never persisted: it is recomputed whenever an action is
/// enqueued, a sync pass completes, or connectivity changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Whether the remote collaborator is believed reachable.
    pub is_online: bool,
    /// Number of actions awaiting replay.
    pub pending_actions: usize,
    /// Completion time of the last sync pass, milliseconds since the Unix
    /// epoch. `None` until a pass has completed.
    pub last_sync_at: Option<u64>,
    /// Whether a sync pass is currently in flight.
    pub is_syncing: bool,
}

/// Owner of the [`SyncStatus`] view.
///
/// A pure read model: every field mirrors state owned elsewhere (the queue,
/// the connectivity monitor, the sync engine) and is pushed here so callers
/// get one immutable snapshot.
#[derive(Debug, Default)]
pub struct StatusReporter {
    inner: RwLock<SyncStatus>,
}

impl StatusReporter {
    /// Creates a reporter with the given initial connectivity assumption.
    #[must_use]
    pub fn new(is_online: bool) -> Self {
        Self {
            inner: RwLock::new(SyncStatus {
                is_online,
                ..SyncStatus::default()
            }),
        }
    }

    /// Returns an immutable snapshot of the current status.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        self.inner.read().clone()
    }

    /// Records the current queue depth.
    pub fn set_pending(&self, pending: usize) {
        self.inner.write().pending_actions = pending;
    }

    /// Records the current connectivity.
    pub fn set_online(&self, online: bool) {
        self.inner.write().is_online = online;
    }

    /// Marks a sync pass as started.
    pub fn begin_sync(&self) {
        self.inner.write().is_syncing = true;
    }

    /// Marks a sync pass as finished at `completed_at`, with the queue
    /// depth left behind.
    pub fn finish_sync(&self, completed_at: u64, pending: usize) {
        let mut status = self.inner.write();
        status.is_syncing = false;
        status.last_sync_at = Some(completed_at);
        status.pending_actions = pending;
    }

    /// Clears the in-flight flag for a pass that could not complete,
    /// without recording a sync time.
    pub fn abort_sync(&self) {
        self.inner.write().is_syncing = false;
    }
}
