//! # Key Casing
//!
//! Domain records serialise with camelCase keys; the record store holds
//! snake_case columns. These converters walk a JSON value recursively and
//! rename object keys only. Values are never touched.
//!
//! Fields whose value is a user-keyed map (a variant's `attributes`, where
//! "Size" or "Pack Size" are data, not field names) are copied verbatim so a
//! store round-trip returns exactly what was written.

use serde_json::{Map, Value};

/// Fields whose value is copied without key conversion.
const VERBATIM_FIELDS: &[&str] = &["attributes"];

/// `amountPaid` → `amount_paid`.
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (idx, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if idx > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `amount_paid` → `amountPaid`.
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn convert(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let renamed = rename(&key);
                let inner = if VERBATIM_FIELDS.contains(&renamed.as_str()) {
                    inner
                } else {
                    convert(inner, rename)
                };
                out.insert(renamed, inner);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| convert(v, rename)).collect()),
        other => other,
    }
}

/// Recursively renames object keys to snake_case.
pub fn to_snake(value: Value) -> Value {
    convert(value, &camel_to_snake)
}

/// Recursively renames object keys to camelCase.
pub fn to_camel(value: Value) -> Value {
    convert(value, &snake_to_camel)
}
