use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::dispatcher::{Controller, HandlerRegistry, HandlerResult};
use crate::router::{HandlerRef, RouteTable};
use crate::server::{Request, Response};

/// Controller that answers every method by echoing the request back.
///
/// Used by the `probe` command so a schema can be exercised before any
/// real controller exists.
#[derive(Debug, Clone)]
pub struct EchoController {
    type_name: String,
}

impl EchoController {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

impl Controller for EchoController {
    fn dispatch(&mut self, method: &str, response: &mut Response, request: &Request) -> Option<HandlerResult> {
        // sorted for stable output
        let params: Map<String, Value> = request
            .combined()
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>()
            .into_iter()
            .collect();
        Some(response.write(&json!({
            "handler": format!("{}::{method}", self.type_name),
            "method": request.method().as_str(),
            "path": request.path(),
            "params": params,
        })))
    }
}

/// Register an [`EchoController`] for every controller type named by `table`.
///
/// Returns the registered type names.
pub fn register_echo_controllers(registry: &mut HandlerRegistry, table: &RouteTable) -> Vec<String> {
    let types: BTreeSet<String> = table
        .routes()
        .iter()
        .filter_map(|r| match r.handler() {
            HandlerRef::Method { type_name, .. } => Some(type_name.clone()),
            HandlerRef::Closure(_) => None,
        })
        .collect();
    for type_name in &types {
        let name = type_name.clone();
        registry.register(type_name.clone(), move || {
            Ok(Box::new(EchoController::new(name.clone())) as Box<dyn Controller>)
        });
    }
    types.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Route;
    use http::Method;

    #[test]
    fn echoes_handler_and_params() {
        let mut controller = EchoController::new("Items");
        let mut req = Request::new(Method::GET, "/items/7?verbose=1");
        req.append_variables([("id", "7")]);
        let mut res = Response::new();
        controller.dispatch("show", &mut res, &req).unwrap().unwrap();

        let crate::server::Payload::Structured(body) = res.payload() else {
            panic!("expected structured payload");
        };
        assert_eq!(body["handler"], "Items::show");
        assert_eq!(body["params"]["id"], "7");
        assert_eq!(body["params"]["verbose"], "1");
    }

    #[test]
    fn registers_each_type_once() {
        let table: RouteTable = [
            Route::new([Method::GET], "/a", HandlerRef::method("A", "list")),
            Route::new([Method::POST], "/a", HandlerRef::method("A", "create")),
            Route::new([Method::GET], "/b", HandlerRef::method("B", "list")),
            Route::get("/c", |_, _| Ok(())),
        ]
        .into_iter()
        .collect();
        let mut registry = HandlerRegistry::new();
        assert_eq!(register_echo_controllers(&mut registry, &table), vec!["A", "B"]);
        assert!(registry.contains("A") && registry.contains("B"));
    }
}
