//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persistent storage cannot be provisioned in this environment.
    ///
    /// Callers are expected to catch this and degrade to the in-memory
    /// backend rather than fail outright.
    #[error("persistent storage unavailable: {message}")]
    Unavailable {
        /// Description of why storage could not be provisioned.
        message: String,
    },

    /// The on-disk log is corrupted.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in a log record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed from the record bytes.
        actual: u32,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Record encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// A schema migration failed.
    #[error("migration to version {version} failed: {message}")]
    MigrationFailed {
        /// Target schema version of the failed migration.
        version: u32,
        /// Description of the failure.
        message: String,
    },

    /// The on-disk schema is newer than this build supports.
    ///
    /// Downgrading would risk silent data loss, so opening fails instead.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Schema version found on disk.
        found: u32,
        /// Highest schema version this build understands.
        supported: u32,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a migration failure error.
    pub fn migration_failed(version: u32, message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            version,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::Closed;
        assert_eq!(err.to_string(), "store is closed");

        let err = StoreError::SchemaTooNew {
            found: 9,
            supported: 2,
        };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn helper_constructors() {
        assert!(matches!(
            StoreError::unavailable("no disk"),
            StoreError::Unavailable { .. }
        ));
        assert!(matches!(
            StoreError::corrupted("bad magic"),
            StoreError::Corrupted { .. }
        ));
        assert!(matches!(
            StoreError::migration_failed(2, "boom"),
            StoreError::MigrationFailed { version: 2, .. }
        ));
    }
}
