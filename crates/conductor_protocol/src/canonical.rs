//! Canonical JSON serialization for deterministic hashing.
//!
//! Object keys are emitted in sorted order with compact separators, so the
//! same logical payload always produces the same byte string regardless of
//! map insertion order.

use serde_json::Value;

/// Serialize a JSON value with sorted object keys and compact separators.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                // Display for Value::String produces the quoted, escaped form.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sorted_keys_compact() {
        let value = json!({"b": 1, "a": {"z": true, "m": [1, 2]}});
        assert_eq!(canonical_json(&value), r#"{"a":{"m":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let first = serde_json::from_str::<Value>(r#"{"x":1,"a":2}"#).unwrap();
        let second = serde_json::from_str::<Value>(r#"{"a":2,"x":1}"#).unwrap();
        assert_eq!(canonical_json(&first), canonical_json(&second));
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"k": "line\nbreak \"quoted\""});
        assert_eq!(canonical_json(&value), r#"{"k":"line\nbreak \"quoted\""}"#);
    }
}
