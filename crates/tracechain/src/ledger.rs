//! The Ledger: unified API for recording batch custody history.
//!
//! The Ledger brings together the repository, the attachment store and the
//! per-batch locks. Every write goes through here so the hash chain of a
//! batch is only ever extended at its head.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracechain_core::{
    validate_event_payload, validate_split, AttachmentRefs, Batch, BatchDraft, BatchId,
    BatchStatus, ContentId, Event, EventPayload, EventType, NewEvent,
};
use tracechain_store::{AttachmentError, AttachmentStore, Repository, RepositoryExt};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::lock::{BatchGuard, BatchLocks};
use crate::verify::Verifier;

/// Files to attach to an event, in the order they should be referenced.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    pub documents: Vec<Bytes>,
    pub photos: Vec<Bytes>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, content: impl Into<Bytes>) -> Self {
        self.documents.push(content.into());
        self
    }

    pub fn photo(mut self, content: impl Into<Bytes>) -> Self {
        self.photos.push(content.into());
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One child of a split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPortion {
    pub quantity: f64,
    /// Code for the child batch; `<parent code>-<n>` when absent.
    #[serde(default)]
    pub code: Option<String>,
    /// Custodian of the child; defaults to the parent's.
    #[serde(default)]
    pub holder: Option<String>,
}

impl SplitPortion {
    pub fn new(quantity: f64) -> Self {
        Self {
            quantity,
            code: None,
            holder: None,
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }
}

/// Result of splitting a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub parent: Batch,
    pub children: Vec<Batch>,
    /// The `split` event appended to the parent.
    pub event: Event,
}

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Registering batches
/// - Appending custody events with attachments
/// - Splitting batches
/// - Reading history and attachments
pub struct Ledger<R: Repository, A: AttachmentStore> {
    repo: Arc<R>,
    attachments: Arc<A>,
    locks: BatchLocks,
    config: LedgerConfig,
}

impl<R: Repository, A: AttachmentStore> Ledger<R, A> {
    /// Create a new ledger instance.
    pub fn new(repo: R, attachments: A, config: LedgerConfig) -> Self {
        Self::from_shared(Arc::new(repo), Arc::new(attachments), config)
    }

    /// Create a ledger over backends shared with other components.
    pub fn from_shared(repo: Arc<R>, attachments: Arc<A>, config: LedgerConfig) -> Self {
        Self {
            repo,
            attachments,
            locks: BatchLocks::new(),
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn attachment_store(&self) -> &A {
        &self.attachments
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// A verifier reading from the same repository.
    pub fn verifier(&self) -> Verifier<R> {
        Verifier::new(Arc::clone(&self.repo))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new batch.
    ///
    /// Pins `created_at`, computes the identity hash and derives a code if
    /// the draft has none.
    pub async fn create_batch(&self, draft: BatchDraft) -> Result<Batch> {
        let sealed = draft.seal(now_millis(), None, &self.config.code_prefix)?;
        let batch = self.repo.create_batch(sealed).await?;

        tracing::info!(
            batch_id = %batch.id,
            code = %batch.code,
            batch_hash = %batch.batch_hash,
            "batch created"
        );
        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        Ok(self.repo.get_batch(batch_id).await?)
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        Ok(self.repo.list_batches().await?)
    }

    pub async fn children_of(&self, batch_id: BatchId) -> Result<Vec<Batch>> {
        Ok(self.repo.children_of(batch_id).await?)
    }

    /// Update the custodian-facing status fields of a batch.
    ///
    /// These fields are not hashed; no event is recorded. The transition is
    /// checked and written under the batch lock.
    pub async fn update_custody(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        holder: Option<String>,
    ) -> Result<Batch> {
        let _guard = self.locks.acquire(batch_id, self.config.lock_timeout).await?;

        let batch = self.repo.require_batch(batch_id).await?;
        if !batch.status.can_transition_to(status) {
            return Err(LedgerError::InvalidOperation(format!(
                "batch {} cannot move from {} to {}",
                batch_id,
                batch.status.as_str(),
                status.as_str()
            )));
        }

        self.repo
            .update_batch_status(batch_id, status, holder)
            .await?;
        Ok(self.repo.require_batch(batch_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event to a batch.
    ///
    /// Attachments are uploaded before the batch lock is taken. If any upload
    /// fails nothing is persisted; blobs already stored stay, which is
    /// harmless since they are content-addressed.
    ///
    /// Once the event is stored the call succeeds. A failure to apply the
    /// status it implies is logged, not returned.
    pub async fn append_event(
        &self,
        batch_id: BatchId,
        payload: EventPayload,
        attachments: Attachments,
    ) -> Result<Event> {
        if self.config.validate_on_append {
            validate_event_payload(&payload, attachments.len())?;
        }
        self.repo.require_batch(batch_id).await?;

        let refs = self.upload_all(&attachments).await?;

        let guard = self.locks.acquire(batch_id, self.config.lock_timeout).await?;
        let event = self.append_locked(&guard, payload, refs).await?;

        if let Err(err) = self.apply_implied_status(&event).await {
            tracing::warn!(
                batch_id = %batch_id,
                sequence = event.sequence,
                error = %err,
                "event recorded but batch status not updated"
            );
        }
        drop(guard);

        Ok(event)
    }

    /// Split a batch into child batches.
    ///
    /// Each child keeps the parent's product descriptor, gets its portion as
    /// quantity and links back through `parent_batch_id`. A `split` event
    /// listing the child codes is appended to the parent. Children, event
    /// and the parent's new status are written together or not at all.
    pub async fn split_batch(
        &self,
        parent_id: BatchId,
        portions: Vec<SplitPortion>,
        actor: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<SplitOutcome> {
        let payload = EventPayload::new(EventType::Split, actor).location(location);
        if self.config.validate_on_append {
            validate_event_payload(&payload, 0)?;
        }

        let guard = self.locks.acquire(parent_id, self.config.lock_timeout).await?;

        let parent = self.repo.require_batch(parent_id).await?;
        if parent.status == BatchStatus::Split || parent.status.is_terminal() {
            return Err(LedgerError::InvalidOperation(format!(
                "batch {} is {} and cannot be split",
                parent_id,
                parent.status.as_str()
            )));
        }
        let quantities: Vec<f64> = portions.iter().map(|p| p.quantity).collect();
        validate_split(parent.quantity, &quantities)?;

        let created_at = now_millis();
        let mut drafts = Vec::with_capacity(portions.len());
        for (i, portion) in portions.into_iter().enumerate() {
            let mut draft = BatchDraft::new(parent.product.clone(), portion.quantity);
            // Equal portions hash alike, so unnamed children take a lineage code.
            draft.code = portion
                .code
                .or_else(|| Some(format!("{}-{}", parent.code, i + 1)));
            draft.current_holder = portion.holder.or_else(|| parent.current_holder.clone());

            drafts.push(draft.seal(created_at, Some(parent_id), &self.config.code_prefix)?);
        }

        let codes: Vec<&str> = drafts.iter().map(|c| c.code.as_str()).collect();
        let payload = payload
            .description(format!("Split into {} batches", drafts.len()))
            .notes(codes.join(", "));
        let split_event = self
            .link_next(&guard, payload, AttachmentRefs::default())
            .await?;

        let (children, event) = self.repo.record_split(drafts, split_event).await?;
        let parent = self.repo.require_batch(parent_id).await?;
        drop(guard);

        tracing::info!(
            batch_id = %parent_id,
            children = children.len(),
            sequence = event.sequence,
            event_hash = %event.event_hash,
            "batch split"
        );

        Ok(SplitOutcome {
            parent,
            children,
            event,
        })
    }

    /// Read the head of the chain and link a new event after it. Caller
    /// holds the batch lock.
    async fn link_next(
        &self,
        guard: &BatchGuard<'_>,
        payload: EventPayload,
        refs: AttachmentRefs,
    ) -> Result<NewEvent> {
        let batch_id = guard.batch_id();
        let last = self.repo.last_event(batch_id).await?;
        Ok(NewEvent::link(batch_id, last.as_ref(), payload, refs, now_millis())?)
    }

    /// Link, hash and persist. Caller holds the batch lock.
    async fn append_locked(
        &self,
        guard: &BatchGuard<'_>,
        payload: EventPayload,
        refs: AttachmentRefs,
    ) -> Result<Event> {
        let new_event = self.link_next(guard, payload, refs).await?;
        let event = self.repo.append_event(new_event).await?;
        tracing::info!(
            batch_id = %event.batch_id,
            sequence = event.sequence,
            event_type = event.event_type().as_str(),
            event_hash = %event.event_hash,
            "event appended"
        );
        Ok(event)
    }

    /// Move the batch to the status its event implies. Caller holds the
    /// batch lock.
    async fn apply_implied_status(&self, event: &Event) -> Result<()> {
        let Some(next) = event.event_type().implied_status() else {
            return Ok(());
        };
        let batch = self.repo.require_batch(event.batch_id).await?;
        if batch.status == next {
            return Ok(());
        }
        if !batch.status.can_transition_to(next) {
            tracing::debug!(
                batch_id = %event.batch_id,
                from = batch.status.as_str(),
                to = next.as_str(),
                "status change not applied"
            );
            return Ok(());
        }
        self.repo
            .update_batch_status(event.batch_id, next, None)
            .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attachment Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload documents then photos, keeping the supplied order.
    async fn upload_all(&self, attachments: &Attachments) -> Result<AttachmentRefs> {
        let mut refs = AttachmentRefs::default();
        for content in &attachments.documents {
            refs.documents.push(self.upload(content).await?);
        }
        for content in &attachments.photos {
            refs.photos.push(self.upload(content).await?);
        }
        Ok(refs)
    }

    async fn upload(&self, content: &Bytes) -> Result<ContentId> {
        let store = &self.attachments;
        let cid = self
            .config
            .upload_retry
            .retry_async(
                |_| {
                    let content = content.clone();
                    async move { store.put(content).await }
                },
                AttachmentError::is_transient,
            )
            .await
            .map_err(|failure| {
                tracing::warn!(
                    attempts = failure.attempts,
                    error = %failure.error,
                    "attachment upload failed"
                );
                LedgerError::AttachmentUploadFailed {
                    attempts: failure.attempts,
                    reason: failure.error.to_string(),
                }
            })?;

        tracing::debug!(cid = %cid, bytes = content.len(), "attachment uploaded");
        Ok(cid)
    }

    /// Fetch an attachment by identifier.
    pub async fn fetch_attachment(&self, cid: &ContentId) -> Result<Bytes> {
        Ok(self.attachments.get(cid).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// A batch and its full event history.
    pub async fn history(&self, batch_id: BatchId) -> Result<(Batch, Vec<Event>)> {
        let snapshot = self
            .repo
            .snapshot(batch_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("batch {}", batch_id)))?;
        Ok((snapshot.batch, snapshot.events))
    }
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
