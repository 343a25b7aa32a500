//! Connectivity state tracking.

use std::sync::atomic::{AtomicBool, Ordering};

/// A connectivity transition observed by [`ConnectivityMonitor::set_online`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unreachable became reachable; a sync should be triggered.
    CameOnline,
    /// Reachable became unreachable; informational only.
    WentOffline,
    /// No change.
    Unchanged,
}

/// Tracks whether the remote collaborator is believed reachable.
///
/// The monitor holds only the flag and transition detection; reacting to a
/// transition (triggering a sync, updating status) is the engine's job. The
/// flag is fed by the host environment's connectivity events.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial assumption.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
        }
    }

    /// Returns true if the remote is believed reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the current reachability, returning the transition.
    pub fn set_online(&self, online: bool) -> Transition {
        let was = self.online.swap(online, Ordering::SeqCst);
        match (was, online) {
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        }
    }
}
