use serde_json::Value;

use super::OutputProcessor;
use crate::error::OutputError;

/// `application/json` output; also the negotiation fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProcessor;

impl OutputProcessor for JsonProcessor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError> {
        Ok(serde_json::to_vec(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_insertion_order() {
        let body = JsonProcessor.format(&json!({"b": 1, "a": [true, null]})).unwrap();
        assert_eq!(body, br#"{"b":1,"a":[true,null]}"#);
    }
}
