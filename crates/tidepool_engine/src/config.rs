//! Configuration for the offline engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`crate::OfflineEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the durable store's log file. `None` runs in-memory only.
    pub store_path: Option<PathBuf>,
    /// Upper bound on a single remote dispatch; a dispatch past this is
    /// treated as a failed replay and the pass moves on.
    pub dispatch_timeout: Duration,
    /// Connectivity assumed before the host reports anything.
    pub initially_online: bool,
}

impl EngineConfig {
    /// Creates a configuration with a durable store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Creates a configuration with no durable store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store_path: None,
            ..Self::default()
        }
    }

    /// Sets the per-dispatch timeout.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Sets the initial connectivity assumption.
    #[must_use]
    pub fn with_initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            dispatch_timeout: Duration::from_secs(30),
            initially_online: true,
        }
    }
}
