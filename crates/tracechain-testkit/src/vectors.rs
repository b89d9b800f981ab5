//! Golden test vectors for deterministic verification.
//!
//! These vectors ensure that canonical encoding and hashing produce
//! identical results across all implementations. Expected values were
//! computed outside this crate from the sorted-key JSON text.

use serde_json::json;
use tracechain::core::{
    canonical_string, AttachmentRefs, BatchDraft, BatchId, ContentId, Coordinates, Digest, Event,
    EventId, EventPayload, EventType, NewEvent, Origin, ProductDescriptor,
};

/// A golden batch identity vector.
#[derive(Debug, Clone)]
pub struct BatchVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub quantity: f64,
    pub created_at: i64,
    pub parent_batch_id: Option<u64>,
    /// Expected canonical text.
    pub canonical: &'static str,
    /// Expected batch hash (hex).
    pub batch_hash: &'static str,
}

/// A golden event vector. Events are chained in the order given.
#[derive(Debug, Clone)]
pub struct EventVector {
    pub name: &'static str,
    pub payload: fn() -> EventPayload,
    /// Raw document contents; referenced by CID.
    pub documents: &'static [&'static [u8]],
    pub canonical: &'static str,
    pub event_hash: &'static str,
}

/// A golden content identifier vector.
#[derive(Debug, Clone)]
pub struct CidVector {
    pub content: &'static [u8],
    pub cid: &'static str,
}

/// The product every batch vector registers.
pub fn vector_product() -> ProductDescriptor {
    ProductDescriptor::new("Roma tomatoes", "kg")
        .product_type("vegetable")
        .origin(Origin {
            farm: "Green Valley Farm".into(),
            location: "Fresno, CA".into(),
            coordinates: Some(Coordinates {
                lat: 36.7378,
                lng: -119.7871,
            }),
        })
        .attribute("grade", json!({"size": "L", "organic": true}))
        .attribute("certifications", json!(["USDA Organic", "GAP"]))
}

/// Get all batch vectors.
pub fn batch_vectors() -> Vec<BatchVector> {
    vec![
        BatchVector {
            name: "root batch with integral quantity",
            quantity: 1200.0,
            created_at: 1736870400000, // 2025-01-14T16:00:00Z
            parent_batch_id: None,
            canonical: r#"{"createdAt":1736870400000,"product":{"attributes":{"certifications":["USDA Organic","GAP"],"grade":{"organic":true,"size":"L"}},"name":"Roma tomatoes","origin":{"coordinates":{"lat":36.7378,"lng":-119.7871},"farm":"Green Valley Farm","location":"Fresno, CA"},"productType":"vegetable","unit":"kg"},"quantity":1200}"#,
            batch_hash: "9e8efe676060c8705e3b60dab05a2a8dedcf7501b5cf623b2a82a16c55ae53c3",
        },
        BatchVector {
            name: "split child with fractional quantity",
            quantity: 300.5,
            created_at: 1736956800000,
            parent_batch_id: Some(1),
            canonical: r#"{"createdAt":1736956800000,"parentBatchId":1,"product":{"attributes":{"certifications":["USDA Organic","GAP"],"grade":{"organic":true,"size":"L"}},"name":"Roma tomatoes","origin":{"coordinates":{"lat":36.7378,"lng":-119.7871},"farm":"Green Valley Farm","location":"Fresno, CA"},"productType":"vegetable","unit":"kg"},"quantity":300.5}"#,
            batch_hash: "f88c374212552669bbadc7cce332cf36336ed983b32468506895ea3bf4c21a53",
        },
    ]
}

fn harvest_payload() -> EventPayload {
    EventPayload::new(EventType::Harvested, "Green Valley Farm")
        .description("Picked at dawn")
        .location("Fresno, CA")
        .timestamp(1736870400000)
}

fn shipped_payload() -> EventPayload {
    EventPayload::new(EventType::Shipped, "Valley Cold Freight")
        .location("Fresno, CA")
        .temperature(4.5)
        .humidity(85.0)
        .notes("Reefer \"R-12\"\nsealed")
}

/// Get all event vectors, in chain order on batch 1.
pub fn event_vectors() -> Vec<EventVector> {
    vec![
        EventVector {
            name: "first event with a document",
            payload: harvest_payload,
            documents: &[b"harvest-log.pdf contents"],
            canonical: r#"{"actor":"Green Valley Farm","batchId":1,"description":"Picked at dawn","documents":["bafkreiexn7tmeppwwqcsymtyuj6h5pxrhqtmkz7dc5f3f54hllre6pioiq"],"eventType":"harvested","location":"Fresno, CA","photos":[],"previousEventHash":null,"sequence":0,"timestamp":1736870400000}"#,
            event_hash: "84073356f94ec8a31b2dd3d56f4732b99bb240e94b9c2de7fa64834a5c993a62",
        },
        EventVector {
            name: "linked event with measurements and escapes",
            payload: shipped_payload,
            documents: &[],
            canonical: r#"{"actor":"Valley Cold Freight","batchId":1,"description":"","documents":[],"eventType":"shipped","humidity":85,"location":"Fresno, CA","notes":"Reefer \"R-12\"\nsealed","photos":[],"previousEventHash":"84073356f94ec8a31b2dd3d56f4732b99bb240e94b9c2de7fa64834a5c993a62","sequence":1,"temperature":4.5}"#,
            event_hash: "3e8c971dacf28888a8681ba1a5114800f26ce2014b8f38a072a1cc483bd428e0",
        },
    ]
}

/// Get all CID vectors.
pub fn cid_vectors() -> Vec<CidVector> {
    vec![
        CidVector {
            content: b"hello world",
            cid: "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e",
        },
        CidVector {
            content: b"",
            cid: "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku",
        },
        CidVector {
            content: b"harvest-log.pdf contents",
            cid: "bafkreiexn7tmeppwwqcsymtyuj6h5pxrhqtmkz7dc5f3f54hllre6pioiq",
        },
    ]
}

/// Build the event chain described by [`event_vectors`].
pub fn build_event_chain(vectors: &[EventVector]) -> Vec<Event> {
    let batch_id = BatchId::new(1);
    let mut chain: Vec<Event> = Vec::with_capacity(vectors.len());
    for (i, vector) in vectors.iter().enumerate() {
        let refs = AttachmentRefs {
            documents: vector
                .documents
                .iter()
                .map(|d| ContentId::for_content(d))
                .collect(),
            photos: vec![],
        };
        let event = NewEvent::link(batch_id, chain.last(), (vector.payload)(), refs, 0)
            .expect("vector payloads canonicalize")
            .into_event(EventId::new(i as u64 + 1));
        chain.push(event);
    }
    chain
}

/// Verify all golden vectors.
///
/// Returns `(name, matches, actual)` for each vector, where `actual` is the
/// computed hash or CID.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut report = Vec::new();

    for v in batch_vectors() {
        let sealed = BatchDraft::new(vector_product(), v.quantity)
            .seal(v.created_at, v.parent_batch_id.map(BatchId::new), "V")
            .expect("vector batches are valid");
        let batch = sealed.into_batch(BatchId::new(1));
        let text = canonical_string(&batch.identity()).unwrap_or_default();
        let hex = batch.batch_hash.to_hex();
        let matches = text == v.canonical && hex == v.batch_hash;
        report.push((v.name.to_string(), matches, hex));
    }

    let vectors = event_vectors();
    let chain = build_event_chain(&vectors);
    let mut previous: Option<Digest> = None;
    for (v, event) in vectors.iter().zip(&chain) {
        let text = canonical_string(&event.record_with_previous(previous)).unwrap_or_default();
        let hex = event.event_hash.to_hex();
        let matches = text == v.canonical && hex == v.event_hash;
        report.push((v.name.to_string(), matches, hex));
        previous = Some(event.event_hash);
    }

    for v in cid_vectors() {
        let cid = ContentId::for_content(v.content);
        report.push((
            format!("cid of {:?}", String::from_utf8_lossy(v.content)),
            cid.as_str() == v.cid,
            cid.to_string(),
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracechain::core::verify_chain;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, actual) in verify_all_vectors() {
            assert!(matches, "Vector '{}' produced {}", name, actual);
        }
    }

    #[test]
    fn test_vector_chain_verifies() {
        let batch = BatchDraft::new(vector_product(), 1200.0)
            .seal(1736870400000, None, "V")
            .unwrap()
            .into_batch(BatchId::new(1));
        let chain = build_event_chain(&event_vectors());

        let result = verify_chain(&batch, &chain);
        assert!(result.is_intact());
    }

    #[test]
    fn test_vectors_are_deterministic() {
        let a = build_event_chain(&event_vectors());
        let b = build_event_chain(&event_vectors());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.event_hash, y.event_hash);
        }
    }

    #[test]
    fn test_changed_quantity_changes_hash() {
        let a = BatchDraft::new(vector_product(), 1200.0)
            .seal(1736870400000, None, "V")
            .unwrap();
        let b = BatchDraft::new(vector_product(), 1200.5)
            .seal(1736870400000, None, "V")
            .unwrap();
        assert_ne!(a.batch_hash, b.batch_hash);
    }
}
