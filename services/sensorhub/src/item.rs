//! Conversion of DynamoDB attribute-value items into plain JSON
//!
//! The backend passes table items through untouched, so a device comes back
//! as `{"deviceId": {"S": "dev-1"}}`. Every response is normalised here
//! before it is deserialised into a record type. Values that are already
//! plain JSON pass through unchanged.

use serde_json::{Map, Number, Value};

/// Unwrap attribute-value descriptors recursively
pub fn unwrap_item(value: Value) -> Value {
    match value {
        Value::Object(map) => match descriptor(&map) {
            Some(tag) => unwrap_descriptor(tag, map),
            None => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, unwrap_item(value)))
                    .collect(),
            ),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_item).collect()),
        other => other,
    }
}

fn descriptor(map: &Map<String, Value>) -> Option<&'static str> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    let tag = match key.as_str() {
        "S" if value.is_string() => "S",
        "N" if value.is_string() => "N",
        "BOOL" if value.is_boolean() => "BOOL",
        "NULL" if value.is_boolean() => "NULL",
        "L" if value.is_array() => "L",
        "M" if value.is_object() => "M",
        "SS" if value.is_array() => "SS",
        "NS" if value.is_array() => "NS",
        _ => return None,
    };
    Some(tag)
}

fn unwrap_descriptor(tag: &str, mut map: Map<String, Value>) -> Value {
    let inner = map.remove(tag).unwrap_or(Value::Null);
    match (tag, inner) {
        ("N", Value::String(n)) => number(&n),
        ("NULL", _) => Value::Null,
        ("L", Value::Array(items)) => Value::Array(items.into_iter().map(unwrap_item).collect()),
        ("M", Value::Object(fields)) => unwrap_item(Value::Object(fields)),
        ("NS", Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|n| match n {
                    Value::String(s) => number(&s),
                    other => other,
                })
                .collect(),
        ),
        (_, inner) => inner,
    }
}

fn number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}
