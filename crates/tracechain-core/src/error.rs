//! Error types for Tracechain Core.

use thiserror::Error;

/// Core errors that can occur while building or hashing records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid content identifier: {0}")]
    InvalidContentId(String),
}

/// Validation errors for batch drafts and event payloads.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(f64),

    #[error("{field} must be a finite number")]
    NonFiniteMeasurement { field: &'static str },

    #[error("too many attachments: {count} exceeds maximum of {max}")]
    TooManyAttachments { count: usize, max: usize },

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
