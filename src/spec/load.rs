use std::path::Path;

use anyhow::Context;
use http::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SchemaError;

const METHODS: [&str; 8] = ["get", "post", "put", "delete", "patch", "options", "head", "trace"];

/// One path + method entry of a route schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOperation {
    pub path: String,
    pub method: Method,
    pub operation_id: Option<String>,
    /// Declared success response content types, in document order.
    pub content_types: Vec<String>,
}

/// Structural view of an OpenAPI 3 or Swagger 2 document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDocument {
    pub title: Option<String>,
    /// Path prefix from `servers[0].url` (OpenAPI 3) or `basePath` (Swagger 2).
    pub base_path: String,
    /// Path templates in document order.
    pub paths: Vec<String>,
    pub operations: Vec<SchemaOperation>,
}

impl SchemaDocument {
    /// Operations declared under `path`, in document order.
    pub fn operations_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a SchemaOperation> + 'a {
        self.operations.iter().filter(move |op| op.path == path)
    }

    /// Read the structure out of a parsed document.
    pub fn from_value(doc: &Value) -> Result<Self, SchemaError> {
        let root = doc
            .as_object()
            .ok_or_else(|| SchemaError::Parse("document root is not an object".into()))?;
        let swagger2 = root.contains_key("swagger");
        if !swagger2 && !root.contains_key("openapi") {
            return Err(SchemaError::MissingField("openapi"));
        }
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(SchemaError::MissingField("paths"))?;

        let base_path = if swagger2 {
            root.get("basePath")
                .and_then(Value::as_str)
                .map(normalize_base_path)
                .unwrap_or_default()
        } else {
            root.get("servers")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(|s| s.get("url"))
                .and_then(Value::as_str)
                .map(server_base_path)
                .unwrap_or_default()
        };
        let global_produces = string_list(root.get("produces"));

        let mut document = SchemaDocument {
            title: root
                .get("info")
                .and_then(|i| i.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
            base_path,
            ..Default::default()
        };

        for (path, item) in paths {
            document.paths.push(path.clone());
            let Some(item) = item.as_object() else {
                continue;
            };
            for (key, operation) in item {
                let verb = key.to_ascii_lowercase();
                if !METHODS.contains(&verb.as_str()) {
                    continue;
                }
                let method = Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
                    .map_err(|e| SchemaError::Parse(format!("{path}: {e}")))?;
                let operation_id = operation
                    .get("operationId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let content_types = if swagger2 {
                    let local = string_list(operation.get("produces"));
                    if local.is_empty() {
                        global_produces.clone()
                    } else {
                        local
                    }
                } else {
                    success_content_types(operation)
                };
                document.operations.push(SchemaOperation {
                    path: path.clone(),
                    method,
                    operation_id,
                    content_types,
                });
            }
        }
        debug!(
            paths = document.paths.len(),
            operations = document.operations.len(),
            base_path = %document.base_path,
            "Schema document parsed"
        );
        Ok(document)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Content types of 2xx (then `default`) responses, de-duplicated.
fn success_content_types(operation: &Value) -> Vec<String> {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    let codes = responses
        .iter()
        .filter(|(code, _)| code.starts_with('2'))
        .chain(responses.iter().filter(|(code, _)| code.as_str() == "default"));
    for (_, response) in codes {
        if let Some(content) = response.get("content").and_then(Value::as_object) {
            for mime in content.keys() {
                if !out.contains(mime) {
                    out.push(mime.clone());
                }
            }
        }
    }
    out
}

fn normalize_base_path(p: &str) -> String {
    let p = p.trim_end_matches('/');
    if p.is_empty() {
        String::new()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

fn server_base_path(url_str: &str) -> String {
    url::Url::parse(url_str)
        .or_else(|_| url::Url::parse(&format!("http://dummy{url_str}")))
        .map(|u| normalize_base_path(u.path()))
        .unwrap_or_default()
}

/// Load a YAML (`.yaml`/`.yml`) or JSON schema document from disk.
pub fn load_schema(file_path: impl AsRef<Path>) -> anyhow::Result<SchemaDocument> {
    let file_path = file_path.as_ref();
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("reading schema {}", file_path.display()))?;
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let value: Value = if ext == "yaml" || ext == "yml" {
        serde_yaml::from_str(&content)
            .map_err(|e| SchemaError::Parse(e.to_string()))
            .with_context(|| format!("parsing YAML schema {}", file_path.display()))?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| SchemaError::Parse(e.to_string()))
            .with_context(|| format!("parsing JSON schema {}", file_path.display()))?
    };
    let document = SchemaDocument::from_value(&value)
        .with_context(|| format!("reading structure of {}", file_path.display()))?;
    info!(
        schema = %file_path.display(),
        operations = document.operations.len(),
        "Schema loaded"
    );
    Ok(document)
}
