//! Task input sanitization

use serde_json::Value;

const STRIPPED: [char; 5] = ['<', '>', '"', '\'', '&'];

/// Strip markup-significant characters from a string
pub fn sanitize_str(input: &str) -> String {
    input.chars().filter(|c| !STRIPPED.contains(c)).collect()
}

/// Copy of `value` with every string value sanitized.
///
/// Object keys, numbers, booleans and nulls are kept as-is; arrays and
/// objects are walked recursively.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), sanitize_value(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}
