//! # Tracechain Testkit
//!
//! Testing utilities for Tracechain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known records with expected canonical text, hashes
//!   and CIDs for cross-platform verification
//! - **Generators**: Proptest strategies for products, payloads and JSON
//! - **Fixtures**: In-memory ledgers and a flaky attachment store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use tracechain_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, actual) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, actual);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tracechain_testkit::generators::{product, quantity};
//!
//! proptest! {
//!     #[test]
//!     fn batch_hash_is_deterministic(p in product(), q in quantity()) {
//!         let a = BatchDraft::new(p.clone(), q).seal(0, None, "P").unwrap();
//!         let b = BatchDraft::new(p, q).seal(0, None, "P").unwrap();
//!         prop_assert_eq!(a.batch_hash, b.batch_hash);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use tracechain_testkit::fixtures::TestFixture;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fixture = TestFixture::new();
//! let (batch, events) = fixture.batch_with_events(3).await;
//! assert_eq!(events.len(), 3);
//! # let _ = batch;
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{FlakyAttachmentStore, MemoryLedger, TestFixture};
pub use vectors::{batch_vectors, cid_vectors, event_vectors, verify_all_vectors};
