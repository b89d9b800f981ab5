//! Repository trait: the abstract interface for batch and event persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracechain_core::{Batch, BatchId, BatchStatus, Digest, Event, NewBatch, NewEvent};

use crate::error::{Result, StoreError};

/// A batch and its events as observed in one consistent read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub batch: Batch,
    /// Events ordered by sequence.
    pub events: Vec<Event>,
    /// Number of events observed by the read.
    pub watermark: u64,
}

impl BatchSnapshot {
    pub fn new(batch: Batch, events: Vec<Event>) -> Self {
        let watermark = events.len() as u64;
        Self {
            batch,
            events,
            watermark,
        }
    }
}

/// The Repository trait: async interface for batch and event persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Append-only events**: there is no update or delete for events.
/// - **Unique positions**: appending an event at an occupied
///   `(batch_id, sequence)` returns [`StoreError::Conflict`].
/// - **Contiguous sequences**: an append must land at exactly the next free
///   position; anything else is rejected.
/// - **Mutable status**: only `status` and `current_holder` of a batch can
///   change after creation.
#[async_trait]
pub trait Repository: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Batch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a new batch and assign its id.
    async fn create_batch(&self, batch: NewBatch) -> Result<Batch>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>>;

    /// Update the non-hashed status fields of a batch.
    ///
    /// Returns `NotFound` if the batch does not exist.
    async fn update_batch_status(
        &self,
        id: BatchId,
        status: BatchStatus,
        holder: Option<String>,
    ) -> Result<()>;

    /// All batches ordered by id.
    async fn list_batches(&self) -> Result<Vec<Batch>>;

    /// Batches produced by splitting `parent`, ordered by id.
    async fn children_of(&self, parent: BatchId) -> Result<Vec<Batch>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// The event with the highest sequence in a batch.
    async fn last_event(&self, batch_id: BatchId) -> Result<Option<Event>>;

    /// Append an event and assign its id.
    ///
    /// # Returns
    /// - The stored event on success.
    /// - `NotFound` if the batch does not exist.
    /// - `Conflict` if an event already exists at the same position.
    async fn append_event(&self, event: NewEvent) -> Result<Event>;

    /// All events of a batch ordered by sequence.
    async fn list_events(&self, batch_id: BatchId) -> Result<Vec<Event>>;

    /// Load a batch and its events in one consistent read.
    async fn snapshot(&self, batch_id: BatchId) -> Result<Option<BatchSnapshot>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Split
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a split of `event.batch_id` as one unit: insert every child,
    /// append the parent's `split` event and set the parent to `split`.
    ///
    /// Nothing is written unless every step succeeds.
    ///
    /// # Returns
    /// - The stored children (in input order) and the stored event.
    /// - `DuplicateCode` if a child code is taken or repeated.
    /// - `InvalidData` if a child does not name the parent.
    /// - `NotFound` / `Conflict` as for [`Repository::append_event`].
    async fn record_split(
        &self,
        children: Vec<NewBatch>,
        event: NewEvent,
    ) -> Result<(Vec<Batch>, Event)>;
}

/// Reject a split whose children do not all point at `parent`.
pub(crate) fn check_split_children(parent: BatchId, children: &[NewBatch]) -> Result<()> {
    match children.iter().find(|c| c.parent_batch_id != Some(parent)) {
        Some(child) => Err(StoreError::InvalidData(format!(
            "child {} does not belong to batch {}",
            child.code, parent
        ))),
        None => Ok(()),
    }
}

/// Extension trait for common repository patterns.
pub trait RepositoryExt: Repository {
    /// Get a batch or fail with `NotFound`.
    fn require_batch(
        &self,
        id: BatchId,
    ) -> impl std::future::Future<Output = Result<Batch>> + Send;

    /// Hash of the last event in a batch, or `None` for an empty chain.
    fn head_hash(
        &self,
        batch_id: BatchId,
    ) -> impl std::future::Future<Output = Result<Option<Digest>>> + Send;
}

impl<R: Repository + ?Sized> RepositoryExt for R {
    async fn require_batch(&self, id: BatchId) -> Result<Batch> {
        self.get_batch(id)
            .await?
            .ok_or_else(|| StoreError::batch_not_found(id))
    }

    async fn head_hash(&self, batch_id: BatchId) -> Result<Option<Digest>> {
        Ok(self.last_event(batch_id).await?.map(|e| e.event_hash))
    }
}
