//! # Tracechain Core
//!
//! Pure primitives for Tracechain: batches, events, canonical hashing and
//! chain verification.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over hashed records.
//!
//! ## Key Types
//!
//! - [`Batch`] - A registered quantity of product with an identity hash
//! - [`Event`] - One custody step, linked to its predecessor by hash
//! - [`Digest`] - SHA-256 digest of a canonical record
//! - [`ContentId`] - Content-derived identifier of an attachment
//!
//! ## Canonicalization
//!
//! All hashed records are encoded as canonical JSON. See [`canonical`] module.

pub mod batch;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod types;
pub mod validation;
pub mod verification;

pub use batch::{
    derive_code, Batch, BatchDraft, BatchIdentity, BatchStatus, Coordinates, NewBatch, Origin,
    ProductDescriptor,
};
pub use canonical::{canonical_hash, canonical_json, canonical_string, canonical_value_hash};
pub use crypto::{ContentId, Digest};
pub use error::{CoreError, ValidationError};
pub use event::{
    AttachmentRefs, Event, EventPayload, EventRecord, EventType, NewEvent, MAX_ATTACHMENTS,
};
pub use types::{BatchId, EventId};
pub use validation::{validate_event_payload, validate_product, validate_quantity, validate_split};
pub use verification::{verify_chain, EventValidity, VerificationResult};
