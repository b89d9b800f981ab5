//! Error types for the store module.

use thiserror::Error;
use tracechain_core::{BatchId, ContentId};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An event already occupies this position in the batch.
    #[error("conflict at batch {batch_id} sequence {sequence}")]
    Conflict { batch_id: BatchId, sequence: u64 },

    /// Another batch already uses this code.
    #[error("batch code already in use: {0}")]
    DuplicateCode(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn batch_not_found(id: BatchId) -> Self {
        Self::NotFound(format!("batch {}", id))
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::InvalidData(format!("{} lock poisoned", what))
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from an attachment store.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The backend is temporarily unavailable; the operation may succeed if
    /// retried.
    #[error("transient attachment failure: {0}")]
    Transient(String),

    /// The operation will not succeed on retry.
    #[error("attachment failure: {0}")]
    Permanent(String),

    #[error("attachment not found: {0}")]
    NotFound(ContentId),

    #[error("attachment I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttachmentError {
    /// Whether retrying the same operation can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            Self::Permanent(_) | Self::NotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AttachmentError::Transient("gateway 503".into()).is_transient());
        assert!(!AttachmentError::Permanent("quota".into()).is_transient());
        assert!(!AttachmentError::NotFound(ContentId::for_content(b"x")).is_transient());

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(AttachmentError::from(timed_out).is_transient());
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro");
        assert!(!AttachmentError::from(denied).is_transient());
    }

    #[test]
    fn test_conflict_message() {
        let err = StoreError::Conflict {
            batch_id: BatchId::new(4),
            sequence: 2,
        };
        assert_eq!(err.to_string(), "conflict at batch 4 sequence 2");
    }
}
