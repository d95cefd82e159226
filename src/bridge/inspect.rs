//! Inspected-element payloads and dehydration cleaning
//!
//! The runtime serializes inspected values with large or cyclic parts
//! replaced by marker objects carrying a short preview. Cleaning folds
//! those markers back into plain JSON previews so clients never see the
//! runtime's internal serialization scheme.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::tree::ElementKind;

/// Longest string surfaced to clients before preview truncation
const MAX_STRING_LEN: usize = 60;
/// Kept prefix length when truncating
const TRUNCATED_PREFIX_LEN: usize = 57;

/// Marker surfaced for function values
const FUNCTION_MARKER: &str = "[Function]";

/// One hook entry of an inspected element
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_hooks: Option<Vec<Hook>>,
}

/// Cleaned inspection result for one component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectedElement {
    pub id: u32,
    pub display_name: String,
    pub kind: ElementKind,
    pub key: Option<String>,
    pub props: Map<String, Value>,
    pub state: Option<Map<String, Value>>,
    pub hooks: Vec<Hook>,
    pub rendered_at: Option<f64>,
}

/// Parse an `inspectedElement` payload of type `full-data` or
/// `hydrated-path` into a cleaned element. Returns None when the payload
/// has no usable `value` object.
pub fn parse_inspected_payload(id: u32, payload: &Value) -> Option<InspectedElement> {
    let value = payload.get("value")?.as_object()?;

    let display_name = value
        .get("displayName")
        .and_then(Value::as_str)
        .unwrap_or("Anonymous")
        .to_string();
    let kind = value
        .get("type")
        .and_then(Value::as_i64)
        .map(ElementKind::from_code)
        .unwrap_or(ElementKind::Other);
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let props = value
        .get("props")
        .and_then(Value::as_object)
        .map(|map| clean_object(map))
        .unwrap_or_default();
    let state = value
        .get("state")
        .and_then(Value::as_object)
        .map(|map| clean_object(map));

    let hooks = value
        .get("hooks")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_hook).collect())
        .unwrap_or_default();

    let rendered_at = value.get("renderedAt").and_then(Value::as_f64);

    Some(InspectedElement {
        id,
        display_name,
        kind,
        key,
        props,
        state,
        hooks,
        rendered_at,
    })
}

fn parse_hook(value: &Value) -> Option<Hook> {
    let obj = value.as_object()?;
    Some(Hook {
        name: obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        value: obj.get("value").map(clean_value).unwrap_or(Value::Null),
        sub_hooks: obj
            .get("subHooks")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(parse_hook).collect()),
    })
}

/// Replace dehydration markers with their previews, recursing into plain
/// containers and truncating long strings
pub fn clean_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            // Dehydrated marker: {type, preview_short, ...}
            if map.contains_key("type") {
                if let Some(preview) = map.get("preview_short").and_then(Value::as_str) {
                    return Value::String(truncate_string(preview));
                }
                if map.get("type").and_then(Value::as_str) == Some("function") {
                    return Value::String(FUNCTION_MARKER.to_string());
                }
            }
            Value::Object(clean_object(map))
        }
        Value::Array(items) => Value::Array(items.iter().map(clean_value).collect()),
        Value::String(s) => Value::String(truncate_string(s)),
        other => other.clone(),
    }
}

fn clean_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, val)| (key.clone(), clean_value(val)))
        .collect()
}

/// Truncate a string whose JSON encoding exceeds the preview budget
fn truncate_string(s: &str) -> String {
    let encoded_len = serde_json::to_string(s).map_or(s.len(), |e| e.len());
    if encoded_len <= MAX_STRING_LEN {
        return s.to_string();
    }
    format!("{}...", truncate_to_char_boundary(s, TRUNCATED_PREFIX_LEN))
}

/// Safely truncate a string at a UTF-8 char boundary
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
