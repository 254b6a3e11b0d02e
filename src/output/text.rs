use serde_json::Value;

use super::OutputProcessor;
use crate::error::OutputError;

/// `text/plain` output.
///
/// Scalars are printed bare, lists one item per line and records as
/// `key: value` lines. Nested structures fall back to compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProcessor;

fn inline(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            items.iter().map(inline).collect::<Vec<_>>().join(", ")
        }
        other => other.to_string(),
    }
}

impl OutputProcessor for TextProcessor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError> {
        let text = match payload {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {}", inline(v)))
                .collect::<Vec<_>>()
                .join("\n"),
            Value::Array(items) => items.iter().map(inline).collect::<Vec<_>>().join("\n"),
            scalar => inline(scalar),
        };
        Ok(text.into_bytes())
    }
}
