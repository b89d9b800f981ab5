//! Error types for the ledger.

use thiserror::Error;
use tracechain_core::{BatchId, CoreError, ValidationError};
use tracechain_store::{AttachmentError, StoreError};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Batch or attachment not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An attachment could not be stored; nothing was persisted.
    #[error("attachment upload failed after {attempts} attempt(s): {reason}")]
    AttachmentUploadFailed { attempts: usize, reason: String },

    /// Attachment store failure outside of an upload.
    #[error("attachment store error: {0}")]
    Attachment(AttachmentError),

    /// A record could not be canonicalized for hashing.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    /// The per-batch lock could not be taken in time.
    #[error("timed out after {waited_ms} ms waiting for batch {batch_id}")]
    LockTimeout { batch_id: BatchId, waited_ms: u64 },

    /// Another event was appended at the same position first.
    #[error("conflict at batch {batch_id} sequence {sequence}")]
    Conflict { batch_id: BatchId, sequence: u64 },

    /// Operation not allowed in the batch's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl LedgerError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::Conflict { .. } | Self::AttachmentUploadFailed { .. }
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict { batch_id, sequence } => Self::Conflict { batch_id, sequence },
            other => Self::Store(other),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Canonicalization(msg) => Self::Canonicalization(msg),
            other => Self::Validation(ValidationError::Core(other)),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Core(core) => core.into(),
            other => Self::Validation(other),
        }
    }
}

impl From<AttachmentError> for LedgerError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::NotFound(cid) => Self::NotFound(format!("attachment {}", cid)),
            other => Self::Attachment(other),
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
