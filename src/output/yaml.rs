use serde_json::Value;

use super::OutputProcessor;
use crate::error::OutputError;

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlProcessor;

impl OutputProcessor for YamlProcessor {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn content_type(&self) -> &'static str {
        "application/x-yaml"
    }

    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError> {
        Ok(serde_yaml::to_string(payload)?.into_bytes())
    }
}
