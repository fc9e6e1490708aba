//! Payment id extraction from provider notifications.
//!
//! The provider has used several shapes over time: `{"data": {"id": ...}}`,
//! `{"resource": "https://.../payments/<id>"}`, and bare query parameters
//! (`?data.id=<id>` or `?id=<id>`). The notification content is only used to learn
//! which payment to re-check.

use serde_json::Value;
use std::collections::HashMap;

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn extract_payment_id(body: &Value, query: &HashMap<String, String>) -> Option<String> {
    if let Some(id) = body.get("data").and_then(|d| d.get("id")).and_then(value_to_id) {
        return Some(id);
    }

    if let Some(resource) = body.get("resource").and_then(Value::as_str) {
        let last = resource
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(last) = last {
            return Some(last.to_string());
        }
    }

    ["data.id", "id"]
        .iter()
        .filter_map(|key| query.get(*key))
        .map(|id| id.trim())
        .find(|id| !id.is_empty())
        .map(str::to_string)
}
