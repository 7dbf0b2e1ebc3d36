//! Runtime payload validation against the schema subset.

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;
use url::Url;

type ValidateResult = Result<(), SchemaViolation>;

/// A single schema violation.
///
/// `code` is stable and machine-matchable; `message` names the offending
/// path (`inputs.foo.bar[2]`); `metadata` carries the violated constraint.
#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct SchemaViolation {
    pub code: &'static str,
    pub message: String,
    pub metadata: Map<String, Value>,
}

impl SchemaViolation {
    fn new(code: &'static str, message: String) -> Self {
        Self {
            code,
            message,
            metadata: Map::new(),
        }
    }

    fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Validate a payload against a schema, labelling failures with `label`
/// as the root path (`inputs` or `outputs`).
pub fn validate_value(payload: &Value, schema: &Value, label: &str) -> ValidateResult {
    if let Some(enum_values) = schema.get("enum").and_then(Value::as_array) {
        validate_enum(payload, enum_values, label)?;
    }

    let schema_type = schema.get("type").and_then(Value::as_str);
    if let Some(schema_type) = schema_type {
        if !matches_type(payload, schema_type) {
            return Err(SchemaViolation::new(
                "schema_type_mismatch",
                format!("{label} must be of type {schema_type}"),
            )
            .with_meta("expected", Value::String(schema_type.to_string())));
        }
    }

    match schema_type {
        Some("object") => validate_object(payload, schema, label)?,
        Some("array") => validate_array(payload, schema, label)?,
        Some("string") => {
            if let Some(format) = schema.get("format").and_then(Value::as_str) {
                validate_format(payload, format, label)?;
            }
            validate_string_constraints(payload, schema, label)?;
        }
        Some("integer") | Some("number") => validate_number_constraints(payload, schema, label)?,
        _ => {}
    }
    Ok(())
}

fn matches_type(payload: &Value, schema_type: &str) -> bool {
    match schema_type {
        "string" => payload.is_string(),
        "array" => payload.is_array(),
        "object" => payload.is_object(),
        "integer" => payload.is_i64() || payload.is_u64(),
        "number" => payload.is_number(),
        "boolean" => payload.is_boolean(),
        _ => true,
    }
}

fn validate_object(payload: &Value, schema: &Value, label: &str) -> ValidateResult {
    let object = match payload.as_object() {
        Some(object) => object,
        None => return Ok(()),
    };

    if let Some(required) = schema.get("required") {
        let required = required.as_array().ok_or_else(|| {
            SchemaViolation::new(
                "schema_required_invalid",
                format!("{label} required must be a list"),
            )
        })?;
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(SchemaViolation::new(
                "schema_missing_required",
                format!("missing required {label} fields: {missing:?}"),
            )
            .with_meta(
                "missing",
                Value::Array(missing.iter().map(|m| Value::String(m.to_string())).collect()),
            ));
        }
    }

    let properties = match schema.get("properties") {
        Some(value) => Some(value.as_object().ok_or_else(|| {
            SchemaViolation::new(
                "schema_properties_invalid",
                format!("{label} properties must be an object"),
            )
        })?),
        None => None,
    };

    // Objects are closed by default when `properties` is declared, open
    // otherwise. `additionalProperties` may widen (true), close (false),
    // or constrain unknowns with a sub-schema.
    let additional = schema.get("additionalProperties");
    let unknown: Vec<&String> = object
        .keys()
        .filter(|key| !properties.is_some_and(|props| props.contains_key(*key)))
        .collect();
    if !unknown.is_empty() {
        match additional {
            Some(Value::Bool(true)) => {}
            None if properties.is_none() => {}
            Some(sub_schema @ Value::Object(_)) => {
                for key in &unknown {
                    validate_value(&object[*key], sub_schema, &format!("{label}.{key}"))?;
                }
            }
            _ => {
                error!(label, unknown = ?unknown, "schema_unknown_field");
                return Err(SchemaViolation::new(
                    "schema_unknown_field",
                    format!("unknown {label} fields: {unknown:?}"),
                )
                .with_meta(
                    "unknown",
                    Value::Array(unknown.iter().map(|k| Value::String((*k).clone())).collect()),
                ));
            }
        }
    }

    if let Some(properties) = properties {
        for (key, prop_schema) in properties {
            if let Some(value) = object.get(key) {
                validate_value(value, prop_schema, &format!("{label}.{key}"))?;
            }
        }
    }
    Ok(())
}

fn validate_array(payload: &Value, schema: &Value, label: &str) -> ValidateResult {
    let items = match payload.as_array() {
        Some(items) => items,
        None => return Ok(()),
    };

    if let Some(min_items) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min_items {
            return Err(SchemaViolation::new(
                "schema_min_items",
                format!("{label} must include at least {min_items} items"),
            )
            .with_meta("minItems", Value::from(min_items)));
        }
    }
    if let Some(max_items) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max_items {
            return Err(SchemaViolation::new(
                "schema_max_items",
                format!("{label} must include at most {max_items} items"),
            )
            .with_meta("maxItems", Value::from(max_items)));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (idx, item) in items.iter().enumerate() {
            validate_value(item, item_schema, &format!("{label}[{idx}]"))?;
        }
    }
    Ok(())
}

fn validate_format(payload: &Value, format: &str, label: &str) -> ValidateResult {
    let value = payload.as_str().ok_or_else(|| {
        SchemaViolation::new(
            "schema_format_type_mismatch",
            format!("{label} must be a string for format {format}"),
        )
        .with_meta("expected_format", Value::String(format.to_string()))
    })?;

    match format {
        "uri" => {
            let ok = Url::parse(value).map(|url| url.has_host()).unwrap_or(false);
            if !ok {
                return Err(SchemaViolation::new(
                    "schema_format_invalid",
                    format!("{label} must be a valid URI"),
                )
                .with_meta("format", Value::String("uri".to_string())));
            }
        }
        "date-time" => {
            let candidate = value.replace('Z', "+00:00");
            if DateTime::parse_from_rfc3339(&candidate).is_err() {
                return Err(SchemaViolation::new(
                    "schema_format_invalid",
                    format!("{label} must be a valid date-time"),
                )
                .with_meta("format", Value::String("date-time".to_string())));
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_string_constraints(payload: &Value, schema: &Value, label: &str) -> ValidateResult {
    let value = match payload.as_str() {
        Some(value) => value,
        None => return Ok(()),
    };
    let length = value.chars().count() as u64;

    if let Some(min_length) = schema.get("minLength").and_then(Value::as_u64) {
        if length < min_length {
            return Err(SchemaViolation::new(
                "schema_min_length",
                format!("{label} must be at least {min_length} characters"),
            )
            .with_meta("minLength", Value::from(min_length)));
        }
    }
    if let Some(max_length) = schema.get("maxLength").and_then(Value::as_u64) {
        if length > max_length {
            return Err(SchemaViolation::new(
                "schema_max_length",
                format!("{label} must be at most {max_length} characters"),
            )
            .with_meta("maxLength", Value::from(max_length)));
        }
    }
    Ok(())
}

fn validate_number_constraints(payload: &Value, schema: &Value, label: &str) -> ValidateResult {
    let value = match payload.as_f64() {
        Some(value) => value,
        None => return Ok(()),
    };

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if value < minimum {
            return Err(SchemaViolation::new(
                "schema_minimum",
                format!("{label} must be >= {minimum}"),
            )
            .with_meta("minimum", Value::from(minimum)));
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
        if value > maximum {
            return Err(SchemaViolation::new(
                "schema_maximum",
                format!("{label} must be <= {maximum}"),
            )
            .with_meta("maximum", Value::from(maximum)));
        }
    }
    Ok(())
}

fn validate_enum(payload: &Value, enum_values: &[Value], label: &str) -> ValidateResult {
    if !enum_values.contains(payload) {
        return Err(SchemaViolation::new(
            "schema_enum_mismatch",
            format!("{label} must be one of {enum_values:?}"),
        )
        .with_meta("enum", Value::Array(enum_values.to_vec())));
    }
    Ok(())
}
