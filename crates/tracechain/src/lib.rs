//! # Tracechain
//!
//! Tamper-evident custody history for product batches.
//!
//! ## Overview
//!
//! Supply-chain actors register batches and append custody events to them.
//! Each event commits to its predecessor by hash, and each batch commits to
//! its identity fields, so any third party can recompute the chain and see
//! whether anything was altered after the fact.
//!
//! - **Batches**: identity (product, quantity, creation time, parent) is
//!   hashed once at creation; status and custodian are mutable and unhashed
//! - **Events**: append-only, contiguous sequences from 0, linked by hash
//! - **Attachments**: documents and photos stored by content identifier
//! - **Verification**: pure recomputation over a consistent snapshot
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tracechain::{Attachments, Ledger, LedgerConfig};
//! use tracechain::core::{BatchDraft, EventPayload, EventType, ProductDescriptor};
//! use tracechain::store::{FsAttachmentStore, SqliteRepository};
//!
//! async fn example() {
//!     let repo = SqliteRepository::open("ledger.db").unwrap();
//!     let files = FsAttachmentStore::open("attachments").unwrap();
//!     let ledger = Ledger::new(repo, files, LedgerConfig::default());
//!
//!     let batch = ledger
//!         .create_batch(BatchDraft::new(ProductDescriptor::new("Honey", "kg"), 40.0))
//!         .await
//!         .unwrap();
//!
//!     ledger
//!         .append_event(
//!             batch.id,
//!             EventPayload::new(EventType::Harvested, "Hill Apiary"),
//!             Attachments::new().photo(b"frame.jpg".to_vec()),
//!         )
//!         .await
//!         .unwrap();
//!
//!     let result = ledger.verifier().verify_batch(batch.id).await.unwrap();
//!     assert!(result.is_intact());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tracechain::core` - Records, canonical hashing, chain verification
//! - `tracechain::store` - Repository and attachment store backends

pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod retry;
pub mod verify;

// Re-export component crates
pub use tracechain_core as core;
pub use tracechain_store as store;

// Re-export main types for convenience
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{Attachments, Ledger, SplitOutcome, SplitPortion};
pub use lock::{BatchGuard, BatchLocks};
pub use retry::{RetryFailure, RetryPolicy};
pub use verify::Verifier;

// Re-export commonly used core types
pub use tracechain_core::{
    Batch, BatchDraft, BatchId, BatchStatus, ContentId, Digest, Event, EventPayload, EventType,
    ProductDescriptor, VerificationResult,
};
