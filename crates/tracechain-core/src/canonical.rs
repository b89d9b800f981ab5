//! Canonical JSON encoding for deterministic hashing.
//!
//! Every record that feeds a digest goes through this module. The rules:
//! - Object keys sorted by UTF-8 byte order, at every nesting level
//! - Array element order preserved
//! - No insignificant whitespace
//! - Integers in plain decimal; integral floats within +/-2^53 render as
//!   integers (`1.0` -> `1`, `-0.0` -> `0`); other floats use the shortest
//!   round-trip decimal form
//! - Strings escaped with one fixed rule set (see [`encode_text`])
//! - `null` is written as `null`; absent keys are simply not written
//!
//! The canonical string is hashed with SHA-256.
//!
//! **CRITICAL**: This encoding is FROZEN. Changing it invalidates every
//! stored batch and event hash.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt::Write;

use crate::crypto::Digest;
use crate::error::CoreError;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert any serializable record into a JSON value.
///
/// Fails with [`CoreError::Canonicalization`] when the record has no JSON
/// form (for example a map with non-string keys).
pub fn to_canonical_value<T: Serialize + ?Sized>(record: &T) -> Result<Value, CoreError> {
    serde_json::to_value(record).map_err(|e| CoreError::Canonicalization(e.to_string()))
}

/// Encode a record to its canonical string.
pub fn canonical_string<T: Serialize + ?Sized>(record: &T) -> Result<String, CoreError> {
    let value = to_canonical_value(record)?;
    Ok(canonical_json(&value))
}

/// Encode an already-built JSON value to its canonical string.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    encode_value(&mut buf, value);
    buf
}

/// Canonical hash of a record: SHA-256 over the canonical string.
pub fn canonical_hash<T: Serialize + ?Sized>(record: &T) -> Result<Digest, CoreError> {
    let value = to_canonical_value(record)?;
    Ok(canonical_value_hash(&value))
}

/// Canonical hash of an already-built JSON value.
pub fn canonical_value_hash(value: &Value) -> Digest {
    Digest::hash(canonical_json(value).as_bytes())
}

/// Recursively encode a JSON value.
fn encode_value(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => encode_number(buf, n),
        Value::String(s) => encode_text(buf, s),
        Value::Array(items) => encode_array(buf, items),
        Value::Object(map) => encode_object(buf, map),
    }
}

fn encode_number(buf: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(buf, "{}", i);
    } else if let Some(u) = n.as_u64() {
        let _ = write!(buf, "{}", u);
    } else if let Some(f) = n.as_f64() {
        encode_float(buf, f);
    }
}

/// Encode a finite float.
///
/// `serde_json` never stores NaN or infinities in a `Number`, so every value
/// reaching this point is finite.
fn encode_float(buf: &mut String, f: f64) {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        let _ = write!(buf, "{}", f as i64);
    } else {
        let _ = write!(buf, "{}", f);
    }
}

/// Encode a string literal.
///
/// Only `"`, `\` and control characters are escaped. Control characters with
/// a short form use it (`\n`, `\t`, ...); the rest use `\u00XX` lowercase.
/// All other code points are written as raw UTF-8.
fn encode_text(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0c}' => buf.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(buf, "\\u{:04x}", c as u32);
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

fn encode_array(buf: &mut String, items: &[Value]) {
    buf.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        encode_value(buf, item);
    }
    buf.push(']');
}

/// Encode an object with keys sorted by their UTF-8 bytes.
fn encode_object(buf: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        encode_text(buf, key);
        buf.push(':');
        encode_value(buf, value);
    }
    buf.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_nested_keys_sorted_at_every_level() {
        let value = json!({
            "zeta": {"b": 1, "a": [{"y": true, "x": null}]},
            "alpha": "first"
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":"first","zeta":{"a":[{"x":null,"y":true}],"b":1}}"#
        );
    }

    #[test]
    fn test_key_order_from_struct_and_map_agree() {
        #[derive(Serialize)]
        struct Reading {
            temperature: i64,
            location: &'static str,
        }

        let mut map = HashMap::new();
        map.insert("location", json!("Warehouse 4"));
        map.insert("temperature", json!(4));

        let from_struct = canonical_hash(&Reading {
            temperature: 4,
            location: "Warehouse 4",
        })
        .unwrap();
        let from_map = canonical_hash(&map).unwrap();
        assert_eq!(from_struct, from_map);
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = canonical_value_hash(&json!(["doc1", "doc2"]));
        let b = canonical_value_hash(&json!(["doc2", "doc1"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_and_absent_are_distinct() {
        let absent = canonical_value_hash(&json!({"a": 1}));
        let null = canonical_value_hash(&json!({"a": 1, "notes": null}));
        assert_ne!(absent, null);
    }

    #[test]
    fn test_float_normalization() {
        assert_eq!(canonical_json(&json!(1.0)), "1");
        assert_eq!(canonical_json(&json!(-0.0)), "0");
        assert_eq!(canonical_json(&json!(2.5)), "2.5");
        assert_eq!(canonical_json(&json!(0.1)), "0.1");
        assert_eq!(canonical_json(&json!(-17)), "-17");
        assert_eq!(canonical_json(&json!(u64::MAX)), "18446744073709551615");
        assert_eq!(
            canonical_value_hash(&json!({"qty": 100})),
            canonical_value_hash(&json!({"qty": 100.0}))
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(canonical_json(&json!("a\"b\\c")), r#""a\"b\\c""#);
        assert_eq!(canonical_json(&json!("line\nnext\ttab")), r#""line\nnext\ttab""#);
        assert_eq!(canonical_json(&json!("\u{01}")), r#""\u0001""#);
        assert_eq!(canonical_json(&json!("café 🍎")), "\"café 🍎\"");
    }

    #[test]
    fn test_unserializable_record_is_rejected() {
        let mut bad: HashMap<Vec<u8>, u8> = HashMap::new();
        bad.insert(vec![1, 2], 3);
        let result = canonical_hash(&bad);
        assert!(matches!(result, Err(CoreError::Canonicalization(_))));
    }

    #[test]
    fn test_hash_is_sha256_of_canonical_string() {
        let value = json!({"b": 2, "a": 1});
        let expected = Digest::hash(br#"{"a":1,"b":2}"#);
        assert_eq!(canonical_value_hash(&value), expected);
    }

    /// Render an object as JSON text with entries in the given order.
    fn render_object(entries: &[(String, Value)]) -> String {
        let body: Vec<String> = entries
            .iter()
            .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), v))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    proptest! {
        #[test]
        fn prop_hash_invariant_under_key_permutation(
            keys in prop::collection::btree_set("[a-z]{1,8}", 1..8),
            inner_keys in prop::collection::btree_set("[A-Za-z_]{1,6}", 1..6),
            seed in any::<i64>(),
        ) {
            let inner: Vec<(String, Value)> = inner_keys
                .iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), json!(seed.wrapping_add(i as i64))))
                .collect();
            let mut inner_rev = inner.clone();
            inner_rev.reverse();

            let outer = |inner_text: &str, reverse: bool| {
                let mut entries: Vec<(String, Value)> = keys
                    .iter()
                    .map(|k| {
                        let nested: Value = serde_json::from_str(inner_text).unwrap();
                        (k.clone(), json!({ "nested": [nested] }))
                    })
                    .collect();
                if reverse {
                    entries.reverse();
                }
                render_object(&entries)
            };

            let forward_text = outer(&render_object(&inner), false);
            let reversed_text = outer(&render_object(&inner_rev), true);

            let forward: Value = serde_json::from_str(&forward_text).unwrap();
            let reversed: Value = serde_json::from_str(&reversed_text).unwrap();
            prop_assert_eq!(canonical_value_hash(&forward), canonical_value_hash(&reversed));
        }

        #[test]
        fn prop_canonical_string_parses_back_to_same_value(n in any::<i64>(), s in ".{0,16}") {
            let value = json!({"n": n, "s": s, "list": [n, s.clone()]});
            let text = canonical_json(&value);
            let parsed: Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
