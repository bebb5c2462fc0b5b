// SPDX-License-Identifier: MPL-2.0

use serde_json::{Map, Value};

/// A stored record: a JSON object keyed by field name
pub type Document = Map<String, Value>;

/// Merge `fields` into `target`.
///
/// Objects merge recursively, `null` removes the field, anything else
/// replaces the existing value.
pub fn merge_fields(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        match value {
            Value::Null => {
                target.remove(&key);
            }
            Value::Object(nested) => {
                match target.get_mut(&key) {
                    Some(Value::Object(existing)) => merge_fields(existing, nested),
                    _ => {
                        let mut fresh = Document::new();
                        merge_fields(&mut fresh, nested);
                        target.insert(key, Value::Object(fresh));
                    }
                }
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

/// Add `delta` to an integer field and return the new value.
/// Missing, fractional, or non-numeric values start from zero.
pub fn increment_field(target: &mut Document, field: &str, delta: i64) -> i64 {
    let current = target.get(field).and_then(Value::as_i64).unwrap_or(0);
    let updated = current.saturating_add(delta);
    target.insert(field.to_string(), Value::from(updated));
    updated
}
