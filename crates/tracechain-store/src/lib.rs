//! # Tracechain Store
//!
//! Storage abstraction for Tracechain. Provides trait-based interfaces for
//! batch/event persistence and attachment blobs, with SQLite, in-memory and
//! filesystem implementations.
//!
//! ## Key Types
//!
//! - [`Repository`] - The async trait for batch and event persistence
//! - [`SqliteRepository`] - SQLite-based persistent storage
//! - [`MemoryRepository`] - In-memory storage for tests
//! - [`BatchSnapshot`] - A batch and its events from one consistent read
//! - [`AttachmentStore`] - The async trait for content-addressed blobs
//! - [`FsAttachmentStore`] / [`MemoryAttachmentStore`] - Blob backends
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tracechain_store::{Repository, SqliteRepository};
//! use tracechain_core::{BatchDraft, ProductDescriptor};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let repo = SqliteRepository::open("ledger.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let repo = SqliteRepository::open_memory().unwrap();
//!
//!     let draft = BatchDraft::new(ProductDescriptor::new("Honey", "kg"), 40.0);
//!     let batch = repo.create_batch(draft.seal(0, None, "BATCH").unwrap()).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Unique positions**: a second event at the same `(batch_id, sequence)` returns `Conflict`
//! - **Consistent snapshots**: batch and events are read together for verification
//! - **Idempotent blobs**: storing the same content twice yields the same id and no new entry

pub mod attachment;
pub mod error;
pub mod fs;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use attachment::{AttachmentResult, AttachmentStore, MemoryAttachmentStore};
pub use error::{AttachmentError, Result, StoreError};
pub use fs::FsAttachmentStore;
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;
pub use traits::{BatchSnapshot, Repository, RepositoryExt};
