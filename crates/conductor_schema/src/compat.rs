//! Structural schema compatibility for pipeline wiring.
//!
//! A source schema is compatible with a target schema when every value the
//! source admits is also admitted by the target: same base type, source
//! enums a subset of target enums, source lower bounds at or above the
//! target's, source upper bounds at or below, arrays recursing into
//! `items`, objects recursing per required field. Incompatibilities are
//! collected, not raised, so registry load can report them all at once.

use serde_json::{Map, Value};

/// Check that `source` satisfies `target`, collecting every mismatch.
pub fn check_compatibility(source: &Value, target: &Value, label: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let source_type = source.get("type").and_then(Value::as_str);
    let target_type = target.get("type").and_then(Value::as_str);

    if let Some(target_type) = target_type {
        match source_type {
            None => {
                errors.push(format!("{label} missing source type for required {target_type}"));
                return errors;
            }
            Some(source_type) if source_type != target_type => {
                errors.push(format!(
                    "{label} type {source_type} incompatible with required {target_type}"
                ));
                return errors;
            }
            _ => {}
        }
    }

    if let Some(target_enum) = target.get("enum").and_then(Value::as_array) {
        match source.get("enum").and_then(Value::as_array) {
            None => errors.push(format!("{label} missing source enum constraint")),
            Some(source_enum) => {
                let missing: Vec<&Value> = source_enum
                    .iter()
                    .filter(|value| !target_enum.contains(value))
                    .collect();
                if !missing.is_empty() {
                    errors.push(format!("{label} enum values not allowed: {missing:?}"));
                }
            }
        }
    }

    match target_type {
        Some("string") => check_string(source, target, label, &mut errors),
        Some("integer") | Some("number") => {
            check_bound(source, target, label, "minimum", Bound::Lower, &mut errors);
            check_bound(source, target, label, "maximum", Bound::Upper, &mut errors);
        }
        Some("array") => check_array(source, target, label, &mut errors),
        Some("object") => check_object(source, target, label, &mut errors),
        _ => {}
    }
    errors
}

fn check_string(source: &Value, target: &Value, label: &str, errors: &mut Vec<String>) {
    if let Some(target_format) = target.get("format").and_then(Value::as_str) {
        match source.get("format").and_then(Value::as_str) {
            None => errors.push(format!("{label} missing source format constraint")),
            Some(source_format) if source_format != target_format => errors.push(format!(
                "{label} format {source_format} incompatible with {target_format}"
            )),
            _ => {}
        }
    }
    check_bound(source, target, label, "minLength", Bound::Lower, errors);
    check_bound(source, target, label, "maxLength", Bound::Upper, errors);
}

fn check_array(source: &Value, target: &Value, label: &str, errors: &mut Vec<String>) {
    check_bound(source, target, label, "minItems", Bound::Lower, errors);
    check_bound(source, target, label, "maxItems", Bound::Upper, errors);
    if let Some(target_items) = target.get("items").filter(|v| v.is_object()) {
        match source.get("items").filter(|v| v.is_object()) {
            None => errors.push(format!("{label} missing source items schema")),
            Some(source_items) => errors.extend(check_compatibility(
                source_items,
                target_items,
                &format!("{label} items"),
            )),
        }
    }
}

fn check_object(source: &Value, target: &Value, label: &str, errors: &mut Vec<String>) {
    let target_required = string_set(target.get("required"));
    let source_required = string_set(source.get("required"));
    let missing: Vec<&String> = target_required
        .iter()
        .filter(|field| !source_required.contains(*field))
        .collect();
    if !missing.is_empty() {
        let mut names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        errors.push(format!("{label} missing required fields {names:?}"));
    }

    let source_properties = properties_map(source);
    let target_properties = properties_map(target);
    for field in &target_required {
        let target_schema = match target_properties.get(field) {
            Some(schema) => schema,
            None => continue,
        };
        match source_properties.get(field) {
            None => errors.push(format!("{label} missing property schema for {field}")),
            Some(source_schema) => errors.extend(check_compatibility(
                source_schema,
                target_schema,
                &format!("{label}.{field}"),
            )),
        }
    }

    match target.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            if source.get("additionalProperties") != Some(&Value::Bool(false)) {
                errors.push(format!(
                    "{label} allows additional properties not accepted by target"
                ));
            }
        }
        Some(target_additional @ Value::Object(_)) => {
            match source.get("additionalProperties") {
                Some(Value::Bool(true)) => {
                    errors.push(format!("{label} additional properties are unconstrained"));
                }
                Some(source_additional @ Value::Object(_)) => errors.extend(check_compatibility(
                    source_additional,
                    target_additional,
                    &format!("{label} additionalProperties"),
                )),
                _ => {}
            }
        }
        _ => {}
    }
}

enum Bound {
    Lower,
    Upper,
}

fn check_bound(
    source: &Value,
    target: &Value,
    label: &str,
    field: &str,
    bound: Bound,
    errors: &mut Vec<String>,
) {
    let target_value = match target.get(field).and_then(Value::as_f64) {
        Some(value) => value,
        None => return,
    };
    match source.get(field).and_then(Value::as_f64) {
        None => errors.push(format!("{label} missing source {field} constraint")),
        Some(source_value) => match bound {
            Bound::Lower if source_value < target_value => errors.push(format!(
                "{label} {field} {source_value} below required {target_value}"
            )),
            Bound::Upper if source_value > target_value => errors.push(format!(
                "{label} {field} {source_value} above allowed {target_value}"
            )),
            _ => {}
        },
    }
}

fn string_set(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn properties_map(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter(|(_, v)| v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_type_compatible() {
        assert!(check_compatibility(
            &json!({"type": "string"}),
            &json!({"type": "string"}),
            "x"
        )
        .is_empty());
    }

    #[test]
    fn test_type_mismatch() {
        let errors =
            check_compatibility(&json!({"type": "integer"}), &json!({"type": "string"}), "x");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("incompatible"));
    }

    #[test]
    fn test_missing_source_type() {
        let errors = check_compatibility(&json!({}), &json!({"type": "string"}), "x");
        assert!(errors[0].contains("missing source type"));
    }

    #[test]
    fn test_enum_subset_required() {
        let source = json!({"type": "string", "enum": ["a", "z"]});
        let target = json!({"type": "string", "enum": ["a", "b"]});
        let errors = check_compatibility(&source, &target, "x");
        assert!(errors.iter().any(|e| e.contains("enum values not allowed")));

        let narrow = json!({"type": "string", "enum": ["a"]});
        assert!(check_compatibility(&narrow, &target, "x").is_empty());
    }

    #[test]
    fn test_numeric_bounds_narrowing() {
        let target = json!({"type": "integer", "minimum": 0, "maximum": 100});
        let inside = json!({"type": "integer", "minimum": 10, "maximum": 90});
        assert!(check_compatibility(&inside, &target, "x").is_empty());

        let below = json!({"type": "integer", "minimum": -5, "maximum": 90});
        assert!(check_compatibility(&below, &target, "x")
            .iter()
            .any(|e| e.contains("below required")));
    }

    #[test]
    fn test_string_format_must_match() {
        let target = json!({"type": "string", "format": "uri"});
        let missing = json!({"type": "string"});
        assert!(check_compatibility(&missing, &target, "x")
            .iter()
            .any(|e| e.contains("missing source format")));
        let wrong = json!({"type": "string", "format": "date-time"});
        assert!(check_compatibility(&wrong, &target, "x")
            .iter()
            .any(|e| e.contains("incompatible")));
    }

    #[test]
    fn test_array_items_recursion() {
        let target = json!({"type": "array", "items": {"type": "string"}});
        let good = json!({"type": "array", "items": {"type": "string"}});
        assert!(check_compatibility(&good, &target, "x").is_empty());
        let bad = json!({"type": "array", "items": {"type": "integer"}});
        assert!(check_compatibility(&bad, &target, "x")
            .iter()
            .any(|e| e.contains("x items")));
    }

    #[test]
    fn test_object_required_and_properties() {
        let target = json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "string"}}
        });
        let missing_required = json!({"type": "object", "properties": {"id": {"type": "string"}}});
        assert!(check_compatibility(&missing_required, &target, "x")
            .iter()
            .any(|e| e.contains("missing required fields")));

        let wrong_field_type = json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}}
        });
        assert!(check_compatibility(&wrong_field_type, &target, "x")
            .iter()
            .any(|e| e.contains("x.id")));
    }

    #[test]
    fn test_closed_target_rejects_open_source() {
        let target = json!({"type": "object", "additionalProperties": false});
        let open = json!({"type": "object"});
        assert!(check_compatibility(&open, &target, "x")
            .iter()
            .any(|e| e.contains("additional properties")));
        let closed = json!({"type": "object", "additionalProperties": false});
        assert!(check_compatibility(&closed, &target, "x").is_empty());
    }
}
