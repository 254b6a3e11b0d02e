use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HttpError, OutputError};
use crate::server::Response;

use super::{CsvProcessor, JsonProcessor, TextProcessor, XmlProcessor, YamlProcessor};

/// Processor used when negotiation finds nothing better.
pub const FALLBACK_PROCESSOR: &str = "json";

/// Content-type specific bundle of body formatter, error formatter and
/// content-type header writer.
///
/// Processors are shared by every in-flight request and must be stateless
/// apart from construction-time configuration.
pub trait OutputProcessor: Send + Sync {
    /// Registry key, e.g. `"json"`.
    fn name(&self) -> &'static str;

    /// Value for the `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Serialize a collapsed payload.
    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError>;

    /// Serialize the uniform error envelope for `error`.
    fn format_error(&self, error: &HttpError, include_trace: bool) -> Result<Vec<u8>, OutputError> {
        self.format(&error_envelope(error, include_trace))
    }

    /// Set `Content-Type` unless the response already carries one.
    fn write_content_type(&self, response: &mut Response) {
        if !response.has_header("content-type") {
            response.set_header("Content-Type", self.content_type());
        }
    }
}

/// Build the error envelope shared by every output format:
/// `{type, code, message, metadata?, trace?}`.
pub fn error_envelope(error: &HttpError, include_trace: bool) -> Value {
    let mut envelope = Map::new();
    envelope.insert("type".into(), Value::String(error.type_label()));
    envelope.insert("code".into(), Value::from(error.status()));
    envelope.insert(
        "message".into(),
        Value::String(error.public_message(include_trace).to_string()),
    );
    if !error.metadata().is_empty() {
        envelope.insert("metadata".into(), Value::Object(error.metadata().clone()));
    }
    if include_trace {
        let trace = error.trace();
        if !trace.is_empty() {
            envelope.insert(
                "trace".into(),
                Value::Array(trace.into_iter().map(Value::String).collect()),
            );
        }
    }
    Value::Object(envelope)
}

/// Strip parameters and normalise case: `"Text/CSV; charset=utf-8"` -> `"text/csv"`.
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Maps processor names and mime types to processors.
///
/// Read-only once the dispatcher is built.
#[derive(Clone, Default)]
pub struct OutputRegistry {
    processors: HashMap<&'static str, Arc<dyn OutputProcessor>>,
    mime_table: HashMap<String, &'static str>,
    default: Option<String>,
}

impl std::fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.processors.keys().collect();
        names.sort();
        f.debug_struct("OutputRegistry")
            .field("processors", &names)
            .field("default", &self.default)
            .finish()
    }
}

impl OutputRegistry {
    /// Empty registry. Negotiation fails until something is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in JSON, XML, CSV, YAML and text processors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonProcessor), &["application/json", "text/json"]);
        registry.register(Arc::new(XmlProcessor), &["application/xml", "text/xml"]);
        registry.register(Arc::new(CsvProcessor), &["text/csv", "application/csv"]);
        registry.register(
            Arc::new(YamlProcessor),
            &["application/x-yaml", "application/yaml", "text/yaml"],
        );
        registry.register(Arc::new(TextProcessor), &["text/plain"]);
        registry
    }

    /// Register `processor` under its name and the given mime types. A later
    /// registration of the same name or mime type replaces the earlier one.
    pub fn register(&mut self, processor: Arc<dyn OutputProcessor>, mimes: &[&str]) {
        let name = processor.name();
        self.mime_table
            .insert(normalize_mime(processor.content_type()), name);
        for mime in mimes {
            self.mime_table.insert(normalize_mime(mime), name);
        }
        self.processors.insert(name, processor);
    }

    /// Processor used whenever a route does not name one.
    pub fn set_default(&mut self, name: Option<String>) {
        self.default = name;
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OutputProcessor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Name of the processor serving `mime`, parameters ignored.
    pub fn name_for_content_type(&self, mime: &str) -> Option<&'static str> {
        self.mime_table.get(&normalize_mime(mime)).copied()
    }

    pub fn by_content_type(&self, mime: &str) -> Option<Arc<dyn OutputProcessor>> {
        self.name_for_content_type(mime)
            .and_then(|name| self.get(name))
    }

    /// Negotiate a processor.
    ///
    /// Order: the route's explicit processor, then the registry default, then
    /// the first entry of `Accept`, then JSON. A name that is not registered
    /// is an error rather than a silent fallback.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Arc<dyn OutputProcessor>, OutputError> {
        if let Some(name) = explicit.or(self.default.as_deref()) {
            return self
                .get(name)
                .ok_or_else(|| OutputError::UnknownProcessor(name.to_string()));
        }

        let first = accept
            .and_then(|a| a.split(',').next())
            .map(normalize_mime)
            .filter(|m| !m.is_empty());
        if let Some(mime) = first {
            if let Some(processor) = self.by_content_type(&mime) {
                debug!(accept = %mime, processor = processor.name(), "Output negotiated from Accept");
                return Ok(processor);
            }
        }

        self.get(FALLBACK_PROCESSOR).ok_or(OutputError::NoProcessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(None, None, "json")]
    #[case(None, Some("application/xml"), "xml")]
    #[case(None, Some("text/csv;q=0.9, application/json"), "csv")]
    #[case(None, Some("application/json, text/csv"), "json")]
    #[case(None, Some("image/png"), "json")]
    #[case(None, Some("*/*"), "json")]
    #[case(Some("text"), Some("application/xml"), "text")]
    fn negotiates(
        #[case] explicit: Option<&str>,
        #[case] accept: Option<&str>,
        #[case] expected: &str,
    ) {
        let registry = OutputRegistry::with_defaults();
        let processor = registry.resolve(explicit, accept).unwrap();
        assert_eq!(processor.name(), expected);
    }

    #[test]
    fn default_beats_accept() {
        let mut registry = OutputRegistry::with_defaults();
        registry.set_default(Some("yaml".into()));
        let processor = registry.resolve(None, Some("application/xml")).unwrap();
        assert_eq!(processor.name(), "yaml");
    }

    #[test]
    fn unknown_explicit_processor_is_an_error() {
        let registry = OutputRegistry::with_defaults();
        assert!(matches!(
            registry.resolve(Some("msgpack"), None),
            Err(OutputError::UnknownProcessor(name)) if name == "msgpack"
        ));
    }

    #[test]
    fn empty_registry_cannot_negotiate() {
        assert!(matches!(
            OutputRegistry::new().resolve(None, None),
            Err(OutputError::NoProcessor)
        ));
    }

    #[test]
    fn content_type_lookup_ignores_parameters() {
        let registry = OutputRegistry::with_defaults();
        assert_eq!(
            registry.name_for_content_type("Application/JSON; charset=utf-8"),
            Some("json")
        );
        assert!(registry.by_content_type("image/png").is_none());
    }

    #[test]
    fn content_type_header_is_not_overwritten() {
        let mut res = Response::new();
        res.set_header("Content-Type", "text/html");
        JsonProcessor.write_content_type(&mut res);
        assert_eq!(res.header("content-type"), Some("text/html"));

        let mut res = Response::new();
        JsonProcessor.write_content_type(&mut res);
        assert_eq!(res.header("content-type"), Some("application/json"));
    }

    #[test]
    fn envelope_includes_trace_only_when_detailed() {
        let err = HttpError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            .with_metadata("retry", false);
        let public = error_envelope(&err, false);
        assert_eq!(
            public,
            json!({
                "type": "Internal Server Error",
                "code": 500,
                "message": "An internal error occurred",
                "metadata": {"retry": false}
            })
        );
        let detailed = error_envelope(&err, true);
        assert_eq!(detailed["message"], "boom");
        assert_eq!(detailed["trace"], json!(["boom"]));
    }
}
