//! Event: one custody step in the history of a batch.
//!
//! Events are append-only. Each one commits to its predecessor through
//! `previous_event_hash`, so editing any stored event breaks the chain
//! from that point on.

use serde::{Deserialize, Serialize};

use crate::batch::BatchStatus;
use crate::canonical::canonical_hash;
use crate::crypto::{ContentId, Digest};
use crate::error::CoreError;
use crate::types::{BatchId, EventId};

/// Maximum number of attachments (documents + photos) on one event.
pub const MAX_ATTACHMENTS: usize = 32;

/// The kind of custody step an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Harvested,
    QualityChecked,
    Stored,
    Processed,
    Packaged,
    Shipped,
    Received,
    Split,
    Sold,
    Recalled,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        Self::Harvested,
        Self::QualityChecked,
        Self::Stored,
        Self::Processed,
        Self::Packaged,
        Self::Shipped,
        Self::Received,
        Self::Split,
        Self::Sold,
        Self::Recalled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harvested => "harvested",
            Self::QualityChecked => "quality_checked",
            Self::Stored => "stored",
            Self::Processed => "processed",
            Self::Packaged => "packaged",
            Self::Shipped => "shipped",
            Self::Received => "received",
            Self::Split => "split",
            Self::Sold => "sold",
            Self::Recalled => "recalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Batch status implied by recording this event, if any.
    pub fn implied_status(self) -> Option<BatchStatus> {
        match self {
            Self::Shipped => Some(BatchStatus::InTransit),
            Self::Processed | Self::Packaged => Some(BatchStatus::Processing),
            Self::Split => Some(BatchStatus::Split),
            Self::Sold => Some(BatchStatus::Completed),
            Self::Recalled => Some(BatchStatus::Recalled),
            Self::Harvested | Self::QualityChecked | Self::Stored | Self::Received => None,
        }
    }
}

/// Caller-supplied event fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_type: EventType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub actor: String,
    /// Actor-claimed time of the step (Unix ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EventPayload {
    pub fn new(event_type: EventType, actor: impl Into<String>) -> Self {
        Self {
            event_type,
            description: String::new(),
            location: String::new(),
            actor: actor.into(),
            timestamp: None,
            temperature: None,
            humidity: None,
            notes: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    pub fn temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    pub fn humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Attachment identifiers of an event, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRefs {
    pub documents: Vec<ContentId>,
    pub photos: Vec<ContentId>,
}

impl AttachmentRefs {
    pub fn len(&self) -> usize {
        self.documents.len() + self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.photos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentId> {
        self.documents.iter().chain(self.photos.iter())
    }
}

/// The record hashed into `event_hash`.
///
/// `previous_event_hash` is always written; `None` encodes as `null`, the
/// sentinel for the first event of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord<'a> {
    pub batch_id: BatchId,
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: &'a EventPayload,
    pub documents: &'a [ContentId],
    pub photos: &'a [ContentId],
    pub previous_event_hash: Option<Digest>,
}

impl EventRecord<'_> {
    pub fn hash(&self) -> Result<Digest, CoreError> {
        canonical_hash(self)
    }
}

/// An event ready to be persisted: linked and hashed, no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub batch_id: BatchId,
    pub sequence: u64,
    pub payload: EventPayload,
    pub attachments: AttachmentRefs,
    pub previous_event_hash: Option<Digest>,
    pub event_hash: Digest,
    pub recorded_at: i64,
}

impl NewEvent {
    /// Link a payload after `previous` (or as the first event) and hash it.
    pub fn link(
        batch_id: BatchId,
        previous: Option<&Event>,
        payload: EventPayload,
        attachments: AttachmentRefs,
        recorded_at: i64,
    ) -> Result<Self, CoreError> {
        let (sequence, previous_event_hash) = match previous {
            Some(prev) => (prev.sequence + 1, Some(prev.event_hash)),
            None => (0, None),
        };

        let event_hash = EventRecord {
            batch_id,
            sequence,
            payload: &payload,
            documents: &attachments.documents,
            photos: &attachments.photos,
            previous_event_hash,
        }
        .hash()?;

        Ok(Self {
            batch_id,
            sequence,
            payload,
            attachments,
            previous_event_hash,
            event_hash,
            recorded_at,
        })
    }

    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            batch_id: self.batch_id,
            sequence: self.sequence,
            payload: self.payload,
            attachments: self.attachments,
            previous_event_hash: self.previous_event_hash,
            event_hash: self.event_hash,
            recorded_at: self.recorded_at,
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub batch_id: BatchId,
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(flatten)]
    pub attachments: AttachmentRefs,
    pub previous_event_hash: Option<Digest>,
    pub event_hash: Digest,
    /// Server time the event was persisted. Not hashed.
    pub recorded_at: i64,
}

impl Event {
    /// The hashed record of this event, linked to `previous_event_hash`.
    pub fn record_with_previous(&self, previous_event_hash: Option<Digest>) -> EventRecord<'_> {
        EventRecord {
            batch_id: self.batch_id,
            sequence: self.sequence,
            payload: &self.payload,
            documents: &self.attachments.documents,
            photos: &self.attachments.photos,
            previous_event_hash,
        }
    }

    /// Recompute the hash from stored fields and the stored link.
    pub fn compute_hash(&self) -> Result<Digest, CoreError> {
        self.record_with_previous(self.previous_event_hash).hash()
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type
    }

    pub fn is_first(&self) -> bool {
        self.sequence == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonical_string;

    fn shipped() -> EventPayload {
        EventPayload::new(EventType::Shipped, "Green Valley Farm")
            .description("Loaded onto reefer truck")
            .location("Fresno, CA")
            .temperature(4.5)
    }

    #[test]
    fn test_first_event_links_to_null_sentinel() {
        let event = NewEvent::link(BatchId::new(1), None, shipped(), AttachmentRefs::default(), 0)
            .unwrap();
        assert_eq!(event.sequence, 0);
        assert_eq!(event.previous_event_hash, None);

        let record = EventRecord {
            batch_id: BatchId::new(1),
            sequence: 0,
            payload: &event.payload,
            documents: &[],
            photos: &[],
            previous_event_hash: None,
        };
        let text = canonical_string(&record).unwrap();
        assert!(text.contains("\"previousEventHash\":null"));
        assert!(!text.contains("notes"));
    }

    #[test]
    fn test_canonical_event_record_layout() {
        let payload = EventPayload::new(EventType::Harvested, "Ana").location("Plot 7");
        let record = EventRecord {
            batch_id: BatchId::new(3),
            sequence: 0,
            payload: &payload,
            documents: &[],
            photos: &[],
            previous_event_hash: None,
        };
        assert_eq!(
            canonical_string(&record).unwrap(),
            r#"{"actor":"Ana","batchId":3,"description":"","documents":[],"eventType":"harvested","location":"Plot 7","photos":[],"previousEventHash":null,"sequence":0}"#
        );
    }

    #[test]
    fn test_next_event_links_to_previous_hash() {
        let first = NewEvent::link(BatchId::new(1), None, shipped(), AttachmentRefs::default(), 0)
            .unwrap()
            .into_event(EventId::new(10));
        let second_payload = EventPayload::new(EventType::Received, "Metro DC");
        let second = NewEvent::link(
            BatchId::new(1),
            Some(&first),
            second_payload,
            AttachmentRefs::default(),
            5,
        )
        .unwrap();

        assert_eq!(second.sequence, 1);
        assert_eq!(second.previous_event_hash, Some(first.event_hash));
        assert_ne!(second.event_hash, first.event_hash);
    }

    #[test]
    fn test_attachments_change_hash() {
        let refs = AttachmentRefs {
            documents: vec![ContentId::for_content(b"bill of lading")],
            photos: vec![],
        };
        let without = NewEvent::link(BatchId::new(1), None, shipped(), AttachmentRefs::default(), 0)
            .unwrap();
        let with = NewEvent::link(BatchId::new(1), None, shipped(), refs, 0).unwrap();
        assert_ne!(without.event_hash, with.event_hash);
    }

    #[test]
    fn test_recorded_at_not_hashed() {
        let a = NewEvent::link(BatchId::new(1), None, shipped(), AttachmentRefs::default(), 1)
            .unwrap();
        let b = NewEvent::link(BatchId::new(1), None, shipped(), AttachmentRefs::default(), 2)
            .unwrap();
        assert_eq!(a.event_hash, b.event_hash);
    }

    #[test]
    fn test_stored_event_recomputes_own_hash() {
        let event = NewEvent::link(BatchId::new(9), None, shipped(), AttachmentRefs::default(), 0)
            .unwrap()
            .into_event(EventId::new(1));
        assert_eq!(event.compute_hash().unwrap(), event.event_hash);
    }

    #[test]
    fn test_event_type_roundtrip_and_status() {
        for t in EventType::ALL {
            assert_eq!(EventType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EventType::Shipped.implied_status(), Some(BatchStatus::InTransit));
        assert_eq!(EventType::Stored.implied_status(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = NewEvent::link(BatchId::new(2), None, shipped(), AttachmentRefs::default(), 7)
            .unwrap()
            .into_event(EventId::new(4));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "shipped");
        assert_eq!(json["batchId"], 2);
        assert!(json["previousEventHash"].is_null());
        assert!(json["documents"].is_array());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
