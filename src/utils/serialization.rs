// src/utils/serialization.rs
//! Canonical JSON encoding of credential fields.
//!
//! This is the single definition of "the bytes that get signed". Signer and
//! verifier both go through [`canonical_bytes`]:
//! - object keys are emitted in lexicographic order, at every nesting level
//! - no whitespace between tokens (`,` and `:` separators only)
//! - the [`SIGNATURE_FIELD`] of the top-level object is never included

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the field that carries a compact credential's signature.
pub const SIGNATURE_FIELD: &str = "sig";

/// Serializes a value into a JSON object map.
///
/// # Errors
/// Fails if the value cannot be represented as JSON or is not an object.
pub fn to_field_map<T: Serialize>(data: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Produces the canonical byte encoding of a field map, excluding the signature field.
///
/// The output is independent of the insertion order of `fields`.
pub fn canonical_bytes(fields: &Map<String, Value>) -> Result<Vec<u8>, serde_json::Error> {
    let mut keys: Vec<&String> = fields.keys().filter(|k| *k != SIGNATURE_FIELD).collect();
    keys.sort();

    let mut ordered = Map::new();
    for key in keys {
        ordered.insert(key.clone(), sorted(&fields[key.as_str()]));
    }
    serde_json::to_vec(&Value::Object(ordered))
}

/// Canonical encoding of any serializable record.
pub fn canonical_bytes_of<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    canonical_bytes(&to_field_map(data)?)
}

// Rebuilds nested objects key by key so ordering holds whether or not
// serde_json's `preserve_order` feature is enabled somewhere in the build.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut ordered = Map::new();
            for key in keys {
                ordered.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(ordered)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construction_order_does_not_matter() {
        let mut a = Map::new();
        a.insert("name".into(), json!("Ada"));
        a.insert("v".into(), json!(1));
        a.insert("mid".into(), json!("CC-1"));

        let mut b = Map::new();
        b.insert("mid".into(), json!("CC-1"));
        b.insert("v".into(), json!(1));
        b.insert("name".into(), json!("Ada"));

        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
        assert_eq!(
            String::from_utf8(canonical_bytes(&a).unwrap()).unwrap(),
            r#"{"mid":"CC-1","name":"Ada","v":1}"#
        );
    }

    #[test]
    fn test_signature_field_is_excluded() {
        let mut fields = Map::new();
        fields.insert("v".into(), json!(1));
        let unsigned = canonical_bytes(&fields).unwrap();

        fields.insert(SIGNATURE_FIELD.into(), json!("MEUCIQ"));
        assert_eq!(canonical_bytes(&fields).unwrap(), unsigned);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let value = json!({"z": {"b": 2, "a": [{"y": 1, "x": 0}]}, "a": null});
        let bytes = canonical_bytes_of(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":null,"z":{"a":[{"x":0,"y":1}],"b":2}}"#
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(to_field_map(&vec![1, 2, 3]).is_err());
    }
}
