//! Chain verification: recompute every hash and compare with what is stored.
//!
//! Verification is pure. It takes a batch and its events as loaded from
//! storage and reports which positions still hold. Tampering is a result,
//! never an error.

use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::crypto::Digest;
use crate::event::Event;

/// Validity of one event in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventValidity {
    pub sequence: u64,
    pub valid: bool,
}

/// Outcome of verifying a batch and its event chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub batch_hash_valid: bool,
    pub event_chain_valid: bool,
    pub first_invalid_index: Option<usize>,
    pub events: Vec<EventValidity>,
}

impl VerificationResult {
    /// Both the batch identity and the whole chain check out.
    pub fn is_intact(&self) -> bool {
        self.batch_hash_valid && self.event_chain_valid
    }
}

/// Verify a batch identity hash and its event chain.
///
/// `events` must be in stored order. Event `i` is valid iff:
/// - its sequence is `i`
/// - its stored link equals the expected previous hash (`None` for `i == 0`,
///   otherwise the stored hash of event `i - 1`)
/// - recomputing its hash with the expected link yields the stored hash
///
/// Later events are still checked after a failure so callers can see every
/// position that is off.
pub fn verify_chain(batch: &Batch, events: &[Event]) -> VerificationResult {
    let batch_hash_valid = matches!(batch.compute_hash(), Ok(h) if h == batch.batch_hash);

    let mut expected_previous: Option<Digest> = None;
    let mut first_invalid_index = None;
    let mut results = Vec::with_capacity(events.len());

    for (i, event) in events.iter().enumerate() {
        let valid = event.batch_id == batch.id
            && event.sequence == i as u64
            && event.previous_event_hash == expected_previous
            && matches!(
                event.record_with_previous(expected_previous).hash(),
                Ok(h) if h == event.event_hash
            );

        if !valid && first_invalid_index.is_none() {
            first_invalid_index = Some(i);
        }
        results.push(EventValidity {
            sequence: event.sequence,
            valid,
        });
        expected_previous = Some(event.event_hash);
    }

    VerificationResult {
        batch_hash_valid,
        event_chain_valid: first_invalid_index.is_none(),
        first_invalid_index,
        events: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchDraft, ProductDescriptor};
    use crate::event::{AttachmentRefs, EventPayload, EventType, NewEvent};
    use crate::types::{BatchId, EventId};

    fn batch() -> Batch {
        BatchDraft::new(ProductDescriptor::new("Olive oil", "l"), 500.0)
            .seal(1_700_000_000_000, None, "OIL")
            .unwrap()
            .into_batch(BatchId::new(1))
    }

    fn chain(batch: &Batch, n: usize) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::new();
        for i in 0..n {
            let payload = EventPayload::new(EventType::Stored, format!("actor-{}", i));
            let event = NewEvent::link(
                batch.id,
                events.last(),
                payload,
                AttachmentRefs::default(),
                i as i64,
            )
            .unwrap()
            .into_event(EventId::new(i as u64 + 1));
            events.push(event);
        }
        events
    }

    #[test]
    fn test_intact_chain() {
        let batch = batch();
        let events = chain(&batch, 5);
        let result = verify_chain(&batch, &events);

        assert!(result.is_intact());
        assert_eq!(result.first_invalid_index, None);
        assert_eq!(result.events.len(), 5);
        assert!(result.events.iter().all(|e| e.valid));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let result = verify_chain(&batch(), &[]);
        assert!(result.event_chain_valid);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_payload_tamper_detected_at_position() {
        let batch = batch();
        let mut events = chain(&batch, 5);
        events[2].payload.location = "Somewhere else".into();

        let result = verify_chain(&batch, &events);
        assert!(!result.event_chain_valid);
        assert_eq!(result.first_invalid_index, Some(2));
        assert!(!result.events[2].valid);
        // Stored hashes downstream are untouched, so their links still hold.
        assert!(result.events[3].valid);
    }

    #[test]
    fn test_relinked_event_detected() {
        let batch = batch();
        let mut events = chain(&batch, 3);
        events[1].previous_event_hash = None;
        events[1].event_hash = events[1].compute_hash().unwrap();

        let result = verify_chain(&batch, &events);
        assert_eq!(result.first_invalid_index, Some(1));
    }

    #[test]
    fn test_sequence_gap_detected() {
        let batch = batch();
        let mut events = chain(&batch, 3);
        events.remove(1);

        let result = verify_chain(&batch, &events);
        assert_eq!(result.first_invalid_index, Some(1));
    }

    #[test]
    fn test_batch_tamper_detected() {
        let mut batch = batch();
        batch.quantity = 5000.0;
        let result = verify_chain(&batch, &[]);
        assert!(!result.batch_hash_valid);
        assert!(result.event_chain_valid);
        assert!(!result.is_intact());
    }

    #[test]
    fn test_result_json_shape() {
        let batch = batch();
        let events = chain(&batch, 1);
        let json = serde_json::to_value(verify_chain(&batch, &events)).unwrap();
        assert_eq!(json["batchHashValid"], true);
        assert_eq!(json["eventChainValid"], true);
        assert!(json["firstInvalidIndex"].is_null());
        assert_eq!(json["events"][0]["sequence"], 0);
        assert_eq!(json["events"][0]["valid"], true);
    }
}
