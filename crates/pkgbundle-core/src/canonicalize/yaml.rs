//! Deterministic YAML rendering.

use serde_json::Value;
use serde_yaml::{Mapping, Number, Value as YamlValue};

use super::errors::{SignatureError, SignatureResult};

/// Parse a YAML manifest into a generic document.
pub fn parse_manifest(content: &str) -> SignatureResult<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(SignatureError::document)?;
    if !value.is_object() {
        return Err(SignatureError::Document {
            message: "manifest must be a mapping".to_string(),
        });
    }
    Ok(value)
}

/// Render a document as YAML with every mapping's keys in lexicographic order.
pub fn to_canonical_yaml(value: &Value) -> SignatureResult<Vec<u8>> {
    let sorted = sorted_yaml(value);
    serde_yaml::to_string(&sorted)
        .map(String::into_bytes)
        .map_err(|e| {
            tracing::error!(error = %e, "rendering canonical yaml failed");
            SignatureError::Internal {
                message: e.to_string(),
            }
        })
}

fn sorted_yaml(value: &Value) -> YamlValue {
    match value {
        Value::Null => YamlValue::Null,
        Value::Bool(b) => YamlValue::Bool(*b),
        Value::Number(n) => {
            let number = if let Some(i) = n.as_i64() {
                Number::from(i)
            } else if let Some(u) = n.as_u64() {
                Number::from(u)
            } else {
                Number::from(n.as_f64().unwrap_or_default())
            };
            YamlValue::Number(number)
        }
        Value::String(s) => YamlValue::String(s.clone()),
        Value::Array(items) => YamlValue::Sequence(items.iter().map(sorted_yaml).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut mapping = Mapping::with_capacity(keys.len());
            for key in keys {
                mapping.insert(YamlValue::String(key.clone()), sorted_yaml(&map[key]));
            }
            YamlValue::Mapping(mapping)
        }
    }
}
