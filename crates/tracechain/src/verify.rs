//! Verification service: load a consistent snapshot and re-check its hashes.
//!
//! Verification never touches the attachment store and never writes. A
//! tampered batch is reported through the result, not as an error.

use std::sync::Arc;

use tracechain_core::{verify_chain, BatchId, VerificationResult};
use tracechain_store::Repository;

use crate::error::{LedgerError, Result};

/// Read-only verifier over a repository.
pub struct Verifier<R: Repository> {
    repo: Arc<R>,
}

impl<R: Repository> Clone for Verifier<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: Repository> Verifier<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Recompute the batch hash and every event hash of a batch.
    ///
    /// Returns `NotFound` for an unknown batch.
    pub async fn verify_batch(&self, batch_id: BatchId) -> Result<VerificationResult> {
        let snapshot = self
            .repo
            .snapshot(batch_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("batch {}", batch_id)))?;

        tracing::debug!(
            batch_id = %batch_id,
            watermark = snapshot.watermark,
            "loaded snapshot for verification"
        );

        let result = verify_chain(&snapshot.batch, &snapshot.events);
        if !result.is_intact() {
            tracing::warn!(
                batch_id = %batch_id,
                batch_hash_valid = result.batch_hash_valid,
                first_invalid_index = ?result.first_invalid_index,
                "batch failed verification"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::ledger::{Attachments, Ledger};
    use tracechain_core::{BatchDraft, EventPayload, EventType, ProductDescriptor};
    use tracechain_store::{MemoryAttachmentStore, MemoryRepository};

    async fn ledger_with_events(n: usize) -> (Ledger<MemoryRepository, MemoryAttachmentStore>, BatchId) {
        let ledger = Ledger::new(
            MemoryRepository::new(),
            MemoryAttachmentStore::new(),
            LedgerConfig::default(),
        );
        let batch = ledger
            .create_batch(BatchDraft::new(ProductDescriptor::new("Cacao", "kg"), 800.0))
            .await
            .unwrap();
        for i in 0..n {
            ledger
                .append_event(
                    batch.id,
                    EventPayload::new(EventType::Stored, format!("Warehouse {}", i)),
                    Attachments::new(),
                )
                .await
                .unwrap();
        }
        (ledger, batch.id)
    }

    #[tokio::test]
    async fn test_untouched_batch_verifies() {
        let (ledger, batch_id) = ledger_with_events(4).await;
        let result = ledger.verifier().verify_batch(batch_id).await.unwrap();
        assert!(result.is_intact());
        assert_eq!(result.events.len(), 4);
    }

    #[tokio::test]
    async fn test_tampered_event_reported() {
        let (ledger, batch_id) = ledger_with_events(5).await;
        ledger
            .repository()
            .tamper_event(batch_id, 2, |e| e.payload.actor = "Someone else".into())
            .unwrap();

        let result = ledger.verifier().verify_batch(batch_id).await.unwrap();
        assert!(result.batch_hash_valid);
        assert!(!result.event_chain_valid);
        assert_eq!(result.first_invalid_index, Some(2));
    }

    #[tokio::test]
    async fn test_tampered_batch_reported() {
        let (ledger, batch_id) = ledger_with_events(1).await;
        ledger
            .repository()
            .tamper_batch(batch_id, |b| b.quantity = 8000.0)
            .unwrap();

        let result = ledger.verifier().verify_batch(batch_id).await.unwrap();
        assert!(!result.batch_hash_valid);
        assert!(result.event_chain_valid);
    }

    #[tokio::test]
    async fn test_status_change_does_not_affect_verification() {
        let (ledger, batch_id) = ledger_with_events(1).await;
        ledger
            .update_custody(batch_id, tracechain_core::BatchStatus::Completed, Some("Shop".into()))
            .await
            .unwrap();
        assert!(ledger.verifier().verify_batch(batch_id).await.unwrap().is_intact());
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let (ledger, _) = ledger_with_events(0).await;
        let result = ledger.verifier().verify_batch(BatchId::new(999)).await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }
}
