use thiserror::Error;

use super::HttpError;

/// A matched route points at code that cannot be found or built.
///
/// These never depend on request input; they indicate a misconfigured route
/// and are not retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerResolutionError {
    #[error("no controller registered for type '{type_name}'")]
    UnknownType { type_name: String },
    #[error("controller '{type_name}' could not be instantiated: {reason}")]
    InstantiationFailed { type_name: String, reason: String },
    #[error("controller '{type_name}' has no method '{method}'")]
    UnknownMethod { type_name: String, method: String },
}

impl HandlerResolutionError {
    pub fn type_name(&self) -> &str {
        match self {
            HandlerResolutionError::UnknownType { type_name }
            | HandlerResolutionError::InstantiationFailed { type_name, .. }
            | HandlerResolutionError::UnknownMethod { type_name, .. } => type_name,
        }
    }

    fn reason_code(&self) -> &'static str {
        match self {
            HandlerResolutionError::UnknownType { .. } => "unknown_type",
            HandlerResolutionError::InstantiationFailed { .. } => "instantiation_failed",
            HandlerResolutionError::UnknownMethod { .. } => "unknown_method",
        }
    }
}

impl From<HandlerResolutionError> for HttpError {
    fn from(err: HandlerResolutionError) -> Self {
        let reason = err.reason_code();
        HttpError::internal(err.to_string())
            .private()
            .with_metadata("category", "handler_resolution")
            .with_metadata("reason", reason)
            .with_cause(err)
    }
}

/// Route schema and route pattern failures, raised while building a route table.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema document: {0}")]
    Parse(String),
    #[error("schema document is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid operation id '{operation_id}' on {method} {path}: expected 'Type::method' or 'Type.method'")]
    InvalidOperationId {
        operation_id: String,
        method: String,
        path: String,
    },
    #[error("operation {method} {path} has no operation id")]
    MissingOperationId { method: String, path: String },
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("unknown output processor '{name}' configured for {target}")]
    UnknownProcessor { name: String, target: String },
}

/// Output processor resolution and formatting failures.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output processor named '{0}'")]
    UnknownProcessor(String),
    #[error("no output processor available for negotiation")]
    NoProcessor,
    #[error("json formatting failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml formatting failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("csv formatting failed: {0}")]
    Csv(String),
    #[error("xml formatting failed: {0}")]
    Xml(String),
}

impl From<OutputError> for HttpError {
    fn from(err: OutputError) -> Self {
        HttpError::internal(err.to_string())
            .private()
            .with_metadata("category", "output")
            .with_cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_errors_render_as_private_500() {
        let err: HttpError = HandlerResolutionError::UnknownMethod {
            type_name: "Pets".into(),
            method: "fly".into(),
        }
        .into();
        assert_eq!(err.status(), 500);
        assert_eq!(err.metadata()["category"], "handler_resolution");
        assert_eq!(err.metadata()["reason"], "unknown_method");
        assert!(err.public_message(true).contains("fly"));
        assert!(!err.public_message(false).contains("fly"));
    }

    #[test]
    fn unknown_processor_is_an_internal_error() {
        let err: HttpError = OutputError::UnknownProcessor("msgpack".into()).into();
        assert_eq!(err.status(), 500);
        assert_eq!(err.metadata()["category"], "output");
    }
}
