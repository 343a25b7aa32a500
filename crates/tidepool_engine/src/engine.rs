//! The offline engine: public surface tying queue, cache, connectivity and
//! sync together.

use crate::action::{ActionId, ActionKind};
use crate::cache::CacheStore;
use crate::clock::now_ms;
use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::{EngineError, EngineResult};
use crate::queue::ActionQueue;
use crate::remote::RemoteBackend;
use crate::status::{StatusReporter, SyncStatus};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidepool_store::Store;

/// Outcome of one call to [`OfflineEngine::sync_pending_actions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True if no pass ran (offline, or another pass was in flight).
    pub skipped: bool,
    /// Actions the pass dispatched or tried to dispatch.
    pub attempted: usize,
    /// Actions confirmed by the remote and removed from the queue.
    pub succeeded: usize,
    /// Actions whose dispatch failed; they stay queued for the next pass.
    pub failed: usize,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Offline-first mutation queue and cache engine.
///
/// Construct with [`OfflineEngine::open`], share through an `Arc`. All
/// state lives in the injected store handle; the engine itself holds no
/// global state and two engines over different stores are fully
/// independent.
///
/// The fire-and-forget sync triggers (`enqueue_action` while online,
/// [`OfflineEngine::set_online`]) spawn onto the ambient Tokio runtime, so
/// those two methods must be called from within one.
pub struct OfflineEngine {
    store: Store,
    queue: ActionQueue,
    cache: CacheStore,
    remote: Arc<dyn RemoteBackend>,
    connectivity: ConnectivityMonitor,
    status: StatusReporter,
    syncing: AtomicBool,
    dispatch_timeout: Duration,
}

impl std::fmt::Debug for OfflineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineEngine")
            .field("durable", &self.store.durable())
            .field("status", &self.status.snapshot())
            .finish()
    }
}

impl OfflineEngine {
    /// Opens the engine over the configured store.
    ///
    /// With a store path configured, a durable store is opened there; if
    /// the host cannot provide persistent storage the engine logs a warning
    /// and degrades to in-memory operation instead of failing
    /// ([`OfflineEngine::is_durable`] reports which mode is live). Actions
    /// persisted by an earlier process are immediately visible in the
    /// pending count.
    ///
    /// # Errors
    ///
    /// Fails on store corruption or a failed schema migration - conditions
    /// where continuing could lose queued mutations.
    pub fn open(config: EngineConfig, remote: Arc<dyn RemoteBackend>) -> EngineResult<Self> {
        let store = match &config.store_path {
            Some(path) => tidepool_store::open_or_fallback(path)?,
            None => Store::open_in_memory()?,
        };

        let queue = ActionQueue::new(store.clone());
        let cache = CacheStore::new(store.clone());
        let status = StatusReporter::new(config.initially_online);
        status.set_pending(queue.len()?);

        Ok(Self {
            store,
            queue,
            cache,
            remote,
            connectivity: ConnectivityMonitor::new(config.initially_online),
            status,
            syncing: AtomicBool::new(false),
            dispatch_timeout: config.dispatch_timeout,
        })
    }

    /// Returns true if queued state survives process restarts.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.store.durable()
    }

    /// Queues a mutation for eventual replay.
    ///
    /// The action is persisted before this returns. If the engine is
    /// online, a sync pass is triggered in the background; the enqueue
    /// never waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::EnqueueFailed`] if the action could
    /// not be persisted - the mutation is then not guaranteed and the
    /// caller should retry or surface the failure.
    pub fn enqueue_action(
        self: &Arc<Self>,
        kind: ActionKind,
        target: impl Into<String>,
        payload: serde_json::Value,
    ) -> EngineResult<ActionId> {
        let action = self.queue.enqueue(kind, target, payload)?;
        self.refresh_pending();

        if self.connectivity.is_online() {
            self.spawn_sync();
        }

        Ok(action.id)
    }

    /// Replays queued actions against the remote collaborator, in enqueue
    /// order.
    ///
    /// Idempotent and safe to call repeatedly: a no-op while offline or
    /// while another pass is in flight (the re-entrancy guard admits
    /// exactly one active pass). Each action's outcome is awaited before
    /// the next is dispatched; a failure - including a dispatch that
    /// exceeds the configured timeout - leaves the action queued and the
    /// pass moves on. Actions enqueued mid-pass are picked up on the next
    /// pass.
    ///
    /// # Errors
    ///
    /// Fails only on store errors while reading or pruning the queue;
    /// remote failures are absorbed into the report.
    pub async fn sync_pending_actions(&self) -> EngineResult<SyncReport> {
        if !self.connectivity.is_online() {
            tracing::debug!("sync skipped: offline");
            return Ok(SyncReport::skipped());
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("sync skipped: pass already in flight");
            return Ok(SyncReport::skipped());
        }

        self.status.begin_sync();
        let result = self.run_pass().await;
        match &result {
            Ok(report) => {
                let pending = self.pending_or_last();
                self.status.finish_sync(now_ms(), pending);
                tracing::debug!(
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    pending,
                    "sync pass finished"
                );
            }
            Err(e) => {
                self.status.abort_sync();
                tracing::warn!(error = %e, "sync pass aborted");
            }
        }
        self.syncing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self) -> EngineResult<SyncReport> {
        let actions = self.queue.peek_all()?;
        let mut report = SyncReport {
            skipped: false,
            attempted: actions.len(),
            succeeded: 0,
            failed: 0,
        };

        for action in actions {
            let dispatch = async {
                match action.kind {
                    ActionKind::Insert => self.remote.insert(&action.target, &action.payload).await,
                    ActionKind::Update => self.remote.update(&action.target, &action.payload).await,
                    ActionKind::Delete => self.remote.delete(&action.target, &action.payload).await,
                }
            };

            match tokio::time::timeout(self.dispatch_timeout, dispatch).await {
                Ok(Ok(())) => {
                    // Remove only after confirmed success. A failed removal
                    // means the action may replay again: at-least-once.
                    match self.queue.remove(action.id) {
                        Ok(_) => report.succeeded += 1,
                        Err(e) => {
                            tracing::warn!(id = %action.id, error = %e, "replayed action could not be pruned");
                            report.failed += 1;
                        }
                    }
                }
                Ok(Err(e)) => {
                    let retryable = e.is_retryable();
                    let err = EngineError::replay_failed(action.id, e.to_string());
                    tracing::warn!(
                        kind = %action.kind,
                        target = %action.target,
                        retryable,
                        error = %err,
                        "action retained"
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    let err = EngineError::replay_failed(
                        action.id,
                        format!(
                            "dispatch exceeded {} ms",
                            self.dispatch_timeout.as_millis()
                        ),
                    );
                    tracing::warn!(target = %action.target, error = %err, "action retained");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Records a connectivity change reported by the host environment.
    ///
    /// An unreachable-to-reachable transition triggers a background sync;
    /// the reverse transition only updates the status view.
    pub fn set_online(self: &Arc<Self>, online: bool) {
        let transition = self.connectivity.set_online(online);
        self.status.set_online(online);

        match transition {
            Transition::CameOnline => {
                tracing::info!("connectivity restored, triggering sync");
                self.spawn_sync();
            }
            Transition::WentOffline => {
                tracing::info!("connectivity lost");
            }
            Transition::Unchanged => {}
        }
    }

    /// Caches `value` under `key` for `ttl`. Failures are absorbed.
    pub fn cache_set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.cache.set(key, value, ttl);
    }

    /// Reads a cached value, or `None` if missing, expired or unreadable.
    #[must_use]
    pub fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.get(key)
    }

    /// Empties the cache. The action queue is unaffected.
    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    /// Deletes expired cache entries, returning how many were removed.
    pub fn cache_purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Returns an immutable snapshot of the sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    /// Flushes and closes the underlying store.
    ///
    /// # Errors
    ///
    /// Fails if the final flush fails.
    pub fn close(&self) -> EngineResult<()> {
        Ok(self.store.close()?)
    }

    fn spawn_sync(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.sync_pending_actions().await {
                tracing::warn!(error = %e, "background sync failed");
            }
        });
    }

    fn refresh_pending(&self) {
        match self.queue.len() {
            Ok(pending) => self.status.set_pending(pending),
            Err(e) => tracing::warn!(error = %e, "pending count unavailable"),
        }
    }

    /// Current queue depth, or the last published value when the count
    /// cannot be taken. Queued mutations must never look drained just
    /// because a count failed.
    fn pending_or_last(&self) -> usize {
        match self.queue.len() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "pending count unavailable");
                self.status.snapshot().pending_actions
            }
        }
    }
}
