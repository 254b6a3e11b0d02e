use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{HandlerResolutionError, HttpError};
use crate::router::HandlerFn;
use crate::server::{Request, Response};

/// Result of one handler invocation.
pub type HandlerResult = Result<(), HttpError>;

/// Per-route interceptor that runs immediately around the handler.
///
/// Hooks run in attachment order. An error from `before` aborts the
/// invocation; `after` only runs when the handler succeeded.
pub trait Hook: Send + Sync {
    fn before(&self, _request: &Request, _response: &mut Response) -> HandlerResult {
        Ok(())
    }

    fn after(&self, _request: &Request, _response: &mut Response) -> HandlerResult {
        Ok(())
    }
}

/// Target of a `Type::method` route.
///
/// A fresh instance is built per request by the registered factory.
pub trait Controller: Send {
    /// Run `method`. Returns `None` when the controller has no such method.
    fn dispatch(
        &mut self,
        method: &str,
        response: &mut Response,
        request: &Request,
    ) -> Option<HandlerResult>;
}

/// Builds a controller instance or explains why it could not.
pub type ControllerFactory = Arc<dyn Fn() -> Result<Box<dyn Controller>, String> + Send + Sync>;

/// Controller made of named closures.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, HandlerFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Response, &Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl Controller for MethodTable {
    fn dispatch(
        &mut self,
        method: &str,
        response: &mut Response,
        request: &Request,
    ) -> Option<HandlerResult> {
        self.methods.get(method).map(|f| f(response, request))
    }
}

/// Explicit map from controller type names to factories, plus hooks keyed by
/// `Type::method`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, ControllerFactory>,
    hooks: HashMap<String, Vec<Arc<dyn Hook>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .field("hooked", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller factory. Replaces any earlier registration.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Controller>, String> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            warn!(type_name = %type_name, "Replaced existing controller registration");
        }
        info!(
            type_name = %type_name,
            total_controllers = self.factories.len() + 1,
            "Controller registered"
        );
        self.factories.insert(type_name, Arc::new(factory));
    }

    /// Register a controller built with `Default::default()`.
    pub fn register_default<C>(&mut self, type_name: impl Into<String>)
    where
        C: Controller + Default + 'static,
    {
        self.register(type_name, || Ok(Box::new(C::default()) as Box<dyn Controller>));
    }

    /// Register a [`MethodTable`]; each request gets a clone.
    pub fn register_methods(&mut self, type_name: impl Into<String>, table: MethodTable) {
        self.register(type_name, move || Ok(Box::new(table.clone()) as Box<dyn Controller>));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Attach a hook to every route whose handler is `type_name::method`.
    pub fn add_hook(&mut self, type_name: &str, method: &str, hook: Arc<dyn Hook>) {
        self.hooks
            .entry(format!("{type_name}::{method}"))
            .or_default()
            .push(hook);
    }

    pub fn hooks_for(&self, type_name: &str, method: &str) -> &[Arc<dyn Hook>] {
        self.hooks
            .get(&format!("{type_name}::{method}"))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Build a controller instance for `type_name`.
    pub fn instantiate(&self, type_name: &str) -> Result<Box<dyn Controller>, HandlerResolutionError> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            error!(
                type_name = %type_name,
                available = ?self.factories.keys().collect::<Vec<_>>(),
                "Controller not found"
            );
            HandlerResolutionError::UnknownType {
                type_name: type_name.to_string(),
            }
        })?;
        factory().map_err(|reason| {
            error!(type_name = %type_name, reason = %reason, "Controller instantiation failed");
            HandlerResolutionError::InstantiationFailed {
                type_name: type_name.to_string(),
                reason,
            }
        })
    }

    /// Resolve and run `type_name::method`.
    pub fn invoke(
        &self,
        type_name: &str,
        method: &str,
        response: &mut Response,
        request: &Request,
    ) -> HandlerResult {
        let mut controller = self.instantiate(type_name)?;
        debug!(type_name = %type_name, method = %method, "Controller method invocation");
        match controller.dispatch(method, response, request) {
            Some(result) => result,
            None => {
                error!(type_name = %type_name, method = %method, "Controller method not found");
                Err(HandlerResolutionError::UnknownMethod {
                    type_name: type_name.to_string(),
                    method: method.to_string(),
                }
                .into())
            }
        }
    }
}
