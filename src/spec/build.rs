use std::collections::HashMap;

use tracing::{debug, info};

use super::load::{SchemaDocument, SchemaOperation};
use crate::config::EngineConfig;
use crate::error::SchemaError;
use crate::output::{normalize_mime, OutputRegistry};
use crate::router::{HandlerRef, Route, RouteTable};

/// Output processor selection for schema-derived routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// operationId -> processor name
    pub output_overrides: HashMap<String, String>,
    /// mime -> processor name
    pub content_type_overrides: HashMap<String, String>,
    /// Used when nothing more specific applies.
    pub default_output: Option<String>,
}

impl From<&EngineConfig> for BuildOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            output_overrides: config.output_overrides.clone(),
            content_type_overrides: config
                .content_type_overrides
                .iter()
                .map(|(mime, name)| (normalize_mime(mime), name.clone()))
                .collect(),
            default_output: config.default_output.clone(),
        }
    }
}

/// Split `Type::method` or `Type.method` into its two parts.
///
/// Exactly two non-empty parts are required.
pub fn parse_operation_id(operation_id: &str) -> Option<(&str, &str)> {
    let (type_name, method) = operation_id
        .split_once("::")
        .or_else(|| operation_id.split_once('.'))?;
    let valid = |s: &str| !s.is_empty() && !s.contains("::") && !s.contains('.');
    if valid(type_name) && valid(method) {
        Some((type_name, method))
    } else {
        None
    }
}

fn is_parameterized(path: &str) -> bool {
    path.contains('{')
}

/// Whether `a` must be tried before `b`.
fn precedes(a: &str, b: &str) -> bool {
    match (is_parameterized(a), is_parameterized(b)) {
        (false, true) => true,
        (true, true) => a != b && b.contains(a),
        _ => false,
    }
}

/// Order path templates for matching.
///
/// Literal paths come before parameterized ones. Among parameterized paths
/// one that is a strict substring of another comes first. Everything else
/// keeps document order. Each path is inserted before the first already
/// placed path it must precede.
pub fn sort_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut sorted: Vec<&str> = Vec::new();
    for path in paths {
        let pos = sorted
            .iter()
            .position(|placed| precedes(path, placed))
            .unwrap_or(sorted.len());
        sorted.insert(pos, path);
    }
    sorted
}

/// Pick the processor for one operation.
///
/// Order: operationId override, content-type override, declared content
/// type known to the registry, configured default.
fn resolve_output(
    operation: &SchemaOperation,
    operation_id: &str,
    options: &BuildOptions,
    outputs: &OutputRegistry,
) -> Result<Option<String>, SchemaError> {
    let chosen = options
        .output_overrides
        .get(operation_id)
        .cloned()
        .or_else(|| {
            operation
                .content_types
                .iter()
                .find_map(|mime| options.content_type_overrides.get(&normalize_mime(mime)).cloned())
        })
        .or_else(|| {
            operation
                .content_types
                .iter()
                .find_map(|mime| outputs.name_for_content_type(mime).map(str::to_string))
        })
        .or_else(|| options.default_output.clone());

    match chosen {
        Some(name) if !outputs.contains(&name) => Err(SchemaError::UnknownProcessor {
            name,
            target: operation_id.to_string(),
        }),
        other => Ok(other),
    }
}

/// Derive a route table from a schema document.
///
/// Every operation needs an operation id of the form `Type::method`; routes
/// point at the handler registry rather than closures.
pub fn build_routes(
    document: &SchemaDocument,
    options: &BuildOptions,
    outputs: &OutputRegistry,
) -> Result<RouteTable, SchemaError> {
    let mut table = RouteTable::new();
    for path in sort_paths(document.paths.iter().map(String::as_str)) {
        for operation in document.operations_for(path) {
            let operation_id = operation.operation_id.as_deref().ok_or_else(|| {
                SchemaError::MissingOperationId {
                    method: operation.method.to_string(),
                    path: path.to_string(),
                }
            })?;
            let (type_name, method) = parse_operation_id(operation_id).ok_or_else(|| {
                SchemaError::InvalidOperationId {
                    operation_id: operation_id.to_string(),
                    method: operation.method.to_string(),
                    path: path.to_string(),
                }
            })?;

            let mut route = Route::new(
                [operation.method.clone()],
                format!("{}{}", document.base_path, path),
                HandlerRef::method(type_name, method),
            )
            .name(operation_id);
            if let Some(output) = resolve_output(operation, operation_id, options, outputs)? {
                route = route.output(output);
            }
            debug!(
                method = %operation.method,
                path = %route.pattern(),
                handler = %route.handler().describe(),
                output = route.output_name().unwrap_or("-"),
                "Schema route built"
            );
            table.register(route);
        }
    }
    info!(routes_count = table.len(), "Route table built from schema");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("Pets::show", Some(("Pets", "show")))]
    #[case("Pets.show", Some(("Pets", "show")))]
    #[case("Pets", None)]
    #[case("::show", None)]
    #[case("Pets::", None)]
    #[case("A::b::c", None)]
    #[case("A.b.c", None)]
    fn operation_ids(#[case] input: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(parse_operation_id(input), expected);
    }

    #[test]
    fn literals_first_then_substrings() {
        let sorted = sort_paths([
            "/pet/{id}",
            "/pet/{id}/photos",
            "/pet/all",
            "/pet/{id}/photos/{photo}",
            "/store",
        ]);
        assert_eq!(
            sorted,
            vec![
                "/pet/all",
                "/store",
                "/pet/{id}",
                "/pet/{id}/photos",
                "/pet/{id}/photos/{photo}",
            ]
        );
    }

    #[test]
    fn shorter_parameterized_path_moves_before_its_extension() {
        let sorted = sort_paths(["/a/{x}/b", "/a/{x}"]);
        assert_eq!(sorted, vec!["/a/{x}", "/a/{x}/b"]);
    }

    fn document() -> SchemaDocument {
        SchemaDocument::from_value(&json!({
            "openapi": "3.0.0",
            "paths": {
                "/pet/{id}": {"get": {"operationId": "Pets::show", "responses": {
                    "200": {"content": {"application/xml": {}}}
                }}},
                "/pet/all": {"get": {"operationId": "Pets.list", "responses": {
                    "200": {"content": {"image/png": {}}}
                }}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn builds_sorted_routes_with_outputs() {
        let outputs = OutputRegistry::with_defaults();
        let table = build_routes(&document(), &BuildOptions::default(), &outputs).unwrap();
        assert_eq!(
            table.dump(),
            vec![
                "GET /pet/all -> Pets::list".to_string(),
                "GET /pet/{id} -> Pets::show [xml]".to_string(),
            ]
        );
    }

    #[test]
    fn output_precedence() {
        let outputs = OutputRegistry::with_defaults();
        let mut options = BuildOptions {
            default_output: Some("text".into()),
            ..Default::default()
        };
        options
            .content_type_overrides
            .insert("application/xml".into(), "yaml".into());
        options
            .output_overrides
            .insert("Pets.list".into(), "csv".into());

        let table = build_routes(&document(), &options, &outputs).unwrap();
        let outputs: Vec<_> = table.routes().iter().map(|r| r.output_name()).collect();
        assert_eq!(outputs, vec![Some("csv"), Some("yaml")]);

        options.output_overrides.clear();
        let table = build_routes(&document(), &options, &OutputRegistry::with_defaults()).unwrap();
        assert_eq!(table.routes()[0].output_name(), Some("text"));
    }

    #[test]
    fn invalid_operation_id_and_processor_fail() {
        let doc = SchemaDocument::from_value(&json!({
            "openapi": "3.0.0",
            "paths": {"/x": {"get": {"operationId": "nodots"}}}
        }))
        .unwrap();
        let err = build_routes(&doc, &BuildOptions::default(), &OutputRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidOperationId { ref operation_id, .. } if operation_id == "nodots"));

        let options = BuildOptions {
            default_output: Some("pdf".into()),
            ..Default::default()
        };
        let err = build_routes(&document(), &options, &OutputRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownProcessor { .. }));
        assert_eq!(Method::GET, document().operations[0].method);
    }
}
