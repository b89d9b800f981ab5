//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

use tracechain::core::{
    AttachmentRefs, BatchId, ContentId, Coordinates, EventPayload, EventType, Origin,
    ProductDescriptor,
};

/// Generate a finite float in a range that survives JSON round trips.
pub fn finite_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        (-1_000_000i64..1_000_000i64).prop_map(|n| n as f64),
        -1.0e6..1.0e6f64,
    ]
}

/// Generate a positive quantity.
pub fn quantity() -> impl Strategy<Value = f64> {
    prop_oneof![
        (1u32..100_000u32).prop_map(f64::from),
        0.001..100_000.0f64,
    ]
}

/// Generate a reasonable timestamp (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate a BatchId.
pub fn batch_id() -> impl Strategy<Value = BatchId> {
    (1u64..=1_000_000u64).prop_map(BatchId::new)
}

/// Generate an EventType.
pub fn event_type() -> impl Strategy<Value = EventType> {
    prop::sample::select(EventType::ALL.to_vec())
}

/// Generate a short string, including non-ASCII and characters JSON escapes.
pub fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ,.-]{0,24}",
        "[a-z]{1,8}[\"\\\\\n\t][a-z]{0,8}",
        Just("Café Olé".to_string()),
        Just("茶叶".to_string()),
    ]
}

/// Generate an attribute key.
pub fn key() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,11}"
}

/// Generate a JSON scalar.
pub fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        finite_f64().prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        text().prop_map(Value::String),
    ]
}

/// Generate a nested JSON value.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_scalar().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec((key(), inner), 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate an attribute map.
pub fn attributes() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec((key(), json_value()), 0..6)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Generate an origin, optionally with coordinates.
pub fn origin() -> impl Strategy<Value = Origin> {
    (
        text(),
        text(),
        proptest::option::of((-90.0..90.0f64, -180.0..180.0f64)),
    )
        .prop_map(|(farm, location, coords)| Origin {
            farm,
            location,
            coordinates: coords.map(|(lat, lng)| Coordinates { lat, lng }),
        })
}

/// Generate a valid product descriptor.
pub fn product() -> impl Strategy<Value = ProductDescriptor> {
    (
        "[A-Z][a-z]{2,12}( [a-z]{2,10})?",
        proptest::option::of("[a-z]{3,10}"),
        prop::sample::select(vec!["kg", "lb", "crates", "litres"]),
        proptest::option::of(origin()),
        attributes(),
    )
        .prop_map(|(name, product_type, unit, origin, attributes)| ProductDescriptor {
            name,
            product_type,
            unit: unit.to_string(),
            origin,
            attributes,
        })
}

/// Generate a valid event payload.
pub fn payload() -> impl Strategy<Value = EventPayload> {
    (
        event_type(),
        "[A-Z][a-zA-Z ]{1,20}",
        text(),
        text(),
        proptest::option::of(timestamp()),
        proptest::option::of(-40.0..60.0f64),
        proptest::option::of(0.0..100.0f64),
        proptest::option::of(text()),
    )
        .prop_map(
            |(event_type, actor, description, location, timestamp, temperature, humidity, notes)| {
                EventPayload {
                    event_type,
                    description,
                    location,
                    actor,
                    timestamp,
                    temperature,
                    humidity,
                    notes,
                }
            },
        )
}

/// Generate attachment references for up to `max` blobs.
pub fn attachment_refs(max: usize) -> impl Strategy<Value = AttachmentRefs> {
    let blob = prop::collection::vec(any::<u8>(), 0..64)
        .prop_map(|bytes| ContentId::for_content(&bytes));
    (
        prop::collection::vec(blob.clone(), 0..=max / 2),
        prop::collection::vec(blob, 0..=max / 2),
    )
        .prop_map(|(documents, photos)| AttachmentRefs { documents, photos })
}

/// Rebuild a JSON value with every object's keys inserted in reverse order.
///
/// Produces the same logical value with a different insertion order when
/// `serde_json` preserves order, and is a no-op otherwise.
pub fn reverse_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .rev()
                .map(|(k, v)| (k.clone(), reverse_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(reverse_keys).collect()),
        other => other.clone(),
    }
}
