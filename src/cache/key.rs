//! Content-addressed cache keys.
//!
//! A key is the BLAKE3 hex digest of a canonical JSON document holding the prompt, the
//! model and every extra parameter. Object keys are sorted at every depth, so the order
//! in which parameters were supplied never changes the key.

use serde_json::{Map, Value};

pub fn cache_key(prompt: &str, model: &str, params: &Map<String, Value>) -> String {
    let mut document = Map::new();
    document.insert("model".to_string(), Value::String(model.to_string()));
    document.insert(
        "params".to_string(),
        canonicalize(&Value::Object(params.clone())),
    );
    document.insert("prompt".to_string(), Value::String(prompt.to_string()));

    let canonical = Value::Object(document).to_string();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Rebuild `value` with object keys inserted in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
