//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracechain::core::{
    Batch, BatchDraft, BatchId, ContentId, Event, EventPayload, EventType, Origin,
    ProductDescriptor,
};
use tracechain::store::{
    AttachmentError, AttachmentResult, AttachmentStore, MemoryAttachmentStore, MemoryRepository,
    Repository,
};
use tracechain::{Attachments, Ledger, LedgerConfig, RetryPolicy};

/// Ledger over the in-memory backends.
pub type MemoryLedger = Ledger<MemoryRepository, MemoryAttachmentStore>;

/// A test fixture with an in-memory ledger.
///
/// The ledger is behind an `Arc` so tests can hand it to spawned tasks.
pub struct TestFixture {
    pub ledger: Arc<MemoryLedger>,
}

impl TestFixture {
    /// Create a new fixture with default config.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            ledger: Arc::new(Ledger::new(
                MemoryRepository::new(),
                MemoryAttachmentStore::new(),
                config,
            )),
        }
    }

    /// Register a batch of `quantity` units of a sample product.
    pub async fn create_batch(&self, name: &str, quantity: f64) -> Batch {
        self.ledger
            .create_batch(sample_draft(name, quantity))
            .await
            .expect("create batch")
    }

    /// Append an event without attachments.
    pub async fn append(&self, batch_id: BatchId, event_type: EventType, actor: &str) -> Event {
        self.ledger
            .append_event(batch_id, sample_payload(event_type, actor), Attachments::new())
            .await
            .expect("append event")
    }

    /// Create a batch and append `count` `stored` events to it.
    pub async fn batch_with_events(&self, count: usize) -> (Batch, Vec<Event>) {
        let batch = self.create_batch("Arabica coffee", 500.0).await;
        let mut events = Vec::with_capacity(count);
        for i in 0..count {
            events.push(
                self.append(batch.id, EventType::Stored, &format!("Warehouse {}", i))
                    .await,
            );
        }
        (batch, events)
    }

    pub fn repository(&self) -> &MemoryRepository {
        self.ledger.repository()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A draft for a sample product with an origin.
pub fn sample_draft(name: &str, quantity: f64) -> BatchDraft {
    let product = ProductDescriptor::new(name, "kg")
        .product_type("produce")
        .origin(Origin {
            farm: "Test Farm".into(),
            location: "Salinas, CA".into(),
            coordinates: None,
        });
    BatchDraft::new(product, quantity)
}

/// A payload with a location filled in.
pub fn sample_payload(event_type: EventType, actor: &str) -> EventPayload {
    EventPayload::new(event_type, actor).location("Salinas, CA")
}

/// Retry policy with tiny delays so tests do not sleep for long.
pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 1, 5, 0.0)
}

/// Create a ledger over any repository, with in-memory attachments.
pub fn ledger_over<R: Repository>(repo: R) -> Ledger<R, MemoryAttachmentStore> {
    Ledger::new(repo, MemoryAttachmentStore::new(), LedgerConfig::default())
}

/// Attachment store that fails `put` with a transient error a fixed number
/// of times before delegating to an in-memory store.
pub struct FlakyAttachmentStore {
    inner: MemoryAttachmentStore,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyAttachmentStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryAttachmentStore::new(),
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Total `put` calls seen, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl AttachmentStore for FlakyAttachmentStore {
    async fn put(&self, content: Bytes) -> AttachmentResult<ContentId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AttachmentError::Transient("upload interrupted".into()));
        }
        self.inner.put(content).await
    }

    async fn get(&self, cid: &ContentId) -> AttachmentResult<Bytes> {
        self.inner.get(cid).await
    }

    async fn contains(&self, cid: &ContentId) -> AttachmentResult<bool> {
        self.inner.contains(cid).await
    }
}
