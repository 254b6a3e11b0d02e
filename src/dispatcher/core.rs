//! Dispatcher core module - per-request lifecycle.
//!
//! `Matching -> Before middleware -> {Invoking | short-circuit} -> After
//! middleware -> Rendering`. Any stage may raise an [`HttpError`]; it is
//! carried to rendering and written with the negotiated processor's error
//! formatter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use http::Method;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::handler::{ControllerFactory, HandlerRegistry, HandlerResult, Hook};
use crate::config::EngineConfig;
use crate::error::{HttpError, SchemaError};
use crate::ids::REQUEST_ID_HEADER;
use crate::middleware::{
    AfterContext, BeforeContext, CorsConfigError, Middleware, MiddlewareChain,
    MiddlewareRegistration, StaticFileMiddleware,
};
use crate::output::{JsonProcessor, OutputProcessor, OutputRegistry};
use crate::router::{HandlerRef, MatchResult, Matcher, Route, RouteTable};
use crate::server::{BufferedWriter, Payload, Request, Response, Writer};

/// What happened to one request, returned to the hosting process.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Status written to the wire.
    pub status: u16,
    /// Matched handler identity, if any.
    pub handler: Option<String>,
    /// Error rendered for this request, if any.
    pub error: Option<HttpError>,
    /// True when Before middleware stopped the request before the handler.
    pub short_circuited: bool,
}

/// Request lifecycle engine.
///
/// Routes and output processors are read-only after construction and shared
/// by all requests; the matcher can be swapped atomically with
/// [`Dispatcher::replace_matcher`].
pub struct Dispatcher {
    matcher: ArcSwap<Box<dyn Matcher>>,
    outputs: OutputRegistry,
    handlers: HandlerRegistry,
    middleware: MiddlewareChain,
    detailed_errors: bool,
}

impl Dispatcher {
    /// Dispatcher over `matcher` with the built-in output processors.
    pub fn new(matcher: impl Matcher + 'static) -> Self {
        Self {
            matcher: ArcSwap::from_pointee(Box::new(matcher) as Box<dyn Matcher>),
            outputs: OutputRegistry::with_defaults(),
            handlers: HandlerRegistry::new(),
            middleware: MiddlewareChain::new(),
            detailed_errors: false,
        }
    }

    /// Compile `table` with the regex matcher.
    pub fn from_table(table: &RouteTable) -> Result<Self, SchemaError> {
        Ok(Self::new(table.compile()?))
    }

    /// Apply engine configuration.
    ///
    /// Sets detailed errors and the default processor, then appends CORS and
    /// static-file middleware when configured.
    pub fn configure(&mut self, config: &EngineConfig) -> Result<(), CorsConfigError> {
        self.detailed_errors = config.detailed_errors;
        self.outputs.set_default(config.default_output.clone());
        if let Some(cors) = &config.cors {
            self.add_middleware(Arc::new(cors.build()?));
        }
        if let Some(dir) = &config.static_dir {
            self.add_middleware(Arc::new(StaticFileMiddleware::new(dir.clone())));
        }
        info!(
            detailed_errors = self.detailed_errors,
            default_output = config.default_output.as_deref().unwrap_or("-"),
            middleware = self.middleware.len(),
            "Dispatcher configured"
        );
        Ok(())
    }

    pub fn set_detailed_errors(&mut self, detailed: bool) {
        self.detailed_errors = detailed;
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut OutputRegistry {
        &mut self.outputs
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Register a controller factory for `Type::method` routes.
    pub fn register_controller(&mut self, type_name: &str, factory: ControllerFactory) {
        self.handlers.register(type_name, move || factory());
    }

    /// Attach a hook to every route handled by `type_name::method`.
    pub fn add_handler_hook(&mut self, type_name: &str, method: &str, hook: Arc<dyn Hook>) {
        self.handlers.add_hook(type_name, method, hook);
    }

    /// Add middleware for every path and both phases.
    ///
    /// Middleware is executed in the order it's added.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middleware.push(MiddlewareRegistration::new(mw));
    }

    /// Add middleware restricted to paths matching `scope`.
    pub fn add_scoped_middleware(
        &mut self,
        mw: Arc<dyn Middleware>,
        scope: &str,
    ) -> Result<(), regex::Error> {
        self.middleware
            .push(MiddlewareRegistration::new(mw).scoped(scope)?);
        Ok(())
    }

    pub fn add_registration(&mut self, registration: MiddlewareRegistration) {
        self.middleware.push(registration);
    }

    /// Install a new matcher. In-flight requests keep the one they loaded.
    pub fn replace_matcher(&self, matcher: impl Matcher + 'static) {
        self.matcher.store(Arc::new(Box::new(matcher)));
        info!("Route matcher replaced");
    }

    pub fn replace_routes(&self, table: &RouteTable) -> Result<(), SchemaError> {
        self.replace_matcher(table.compile()?);
        Ok(())
    }

    /// Routes of the current matcher, in match order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.matcher.load().routes()
    }

    /// Adapt, dispatch and return an `http::Response`.
    pub fn handle_http(&self, req: http::Request<Vec<u8>>) -> http::Response<Vec<u8>> {
        let mut writer = BufferedWriter::new();
        let outcome = self.handle(Request::from_http(req), &mut writer);
        writer.into_http_response().unwrap_or_else(|err| {
            error!(error = %err, status = outcome.status, "Rendered response rejected by http builder");
            let mut fallback = http::Response::new(Vec::new());
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }

    /// Run the full lifecycle for `request` and write the response to `writer`.
    pub fn handle(&self, mut request: Request, writer: &mut dyn Writer) -> DispatchOutcome {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();
        let request_id = request.id();

        let route_match = self.matcher.load().match_route(&method, &path);
        if let MatchResult::Found(m) = &route_match {
            let vars: Vec<(String, Value)> = m
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect();
            request.append_variables(vars);
        }
        let handler_id = match &route_match {
            MatchResult::Found(m) => Some(m.route.handler().describe()),
            _ => None,
        };

        let mut response = Response::new();
        response.set_header(REQUEST_ID_HEADER, request_id.to_string());

        let mut failure: Option<HttpError> = None;
        let mut processor: Option<Arc<dyn OutputProcessor>> = None;
        let mut short_circuited = false;

        if let MatchResult::Indeterminate(reason) = &route_match {
            error!(request_id = %request_id, reason = %reason, "Matcher returned an unknown state");
            failure = Some(HttpError::unknown("Route matcher returned an unknown state").private());
        } else {
            let before = {
                let mut ctx = BeforeContext {
                    request: &mut request,
                    response: &mut response,
                    route: &route_match,
                };
                self.middleware.run_before(&mut ctx)
            };

            match before {
                Err(err) => failure = Some(err),
                Ok(outcome) if outcome.is_stop() => {
                    short_circuited = true;
                    debug!(request_id = %request_id, outcome = ?outcome, "Handler skipped by Before middleware");
                }
                Ok(_) => match &route_match {
                    MatchResult::Found(m) => {
                        // Negotiate first so failures during the call render in the right format.
                        match self.outputs.resolve(m.route.output_name(), request.accept()) {
                            Ok(p) => {
                                processor = Some(p);
                                if let Err(err) = self.invoke(&m.route, &mut response, &request) {
                                    failure = Some(err);
                                }
                            }
                            Err(err) => failure = Some(err.into()),
                        }
                    }
                    MatchResult::NotFound => {
                        failure = Some(HttpError::not_found(format!("No route for {method} {path}")));
                    }
                    MatchResult::MethodNotAllowed(allowed) => {
                        let list = allowed
                            .iter()
                            .map(Method::as_str)
                            .collect::<Vec<_>>()
                            .join(", ");
                        response.set_header("Allow", list);
                        failure = Some(HttpError::method_not_allowed(&method, allowed));
                    }
                    MatchResult::Indeterminate(_) => {}
                },
            }
        }

        let after = {
            let mut ctx = AfterContext {
                request: &request,
                response: &mut response,
                route: &route_match,
                handler: handler_id.as_deref(),
                error: failure.as_ref(),
                latency: started.elapsed(),
            };
            self.middleware.run_after(&mut ctx)
        };
        if let Err(err) = after {
            match &failure {
                None => failure = Some(err),
                Some(original) => warn!(
                    request_id = %request_id,
                    error = %err,
                    original = %original,
                    "After middleware failed while request was already failing"
                ),
            }
        }

        let processor = processor.unwrap_or_else(|| self.fallback_processor(&route_match, &request));
        let status = self.render(&request, &mut response, failure.as_ref(), processor.as_ref(), writer);

        let latency = started.elapsed();
        match &failure {
            Some(err) if err.is_server_error() => error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                handler = handler_id.as_deref().unwrap_or("-"),
                status = status,
                error = %err,
                trace = ?err.trace(),
                latency_us = latency.as_micros(),
                "Request failed"
            ),
            Some(err) => warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                handler = handler_id.as_deref().unwrap_or("-"),
                status = status,
                error = %err,
                latency_us = latency.as_micros(),
                "Request rejected"
            ),
            None => info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                handler = handler_id.as_deref().unwrap_or("-"),
                status = status,
                short_circuited = short_circuited,
                latency_us = latency.as_micros(),
                "Request dispatched"
            ),
        }

        DispatchOutcome {
            status,
            handler: handler_id,
            error: failure,
            short_circuited,
        }
    }

    /// Hooks, handler and after-hooks for a matched route.
    fn invoke(&self, route: &Route, response: &mut Response, request: &Request) -> HandlerResult {
        let registry_hooks: &[Arc<dyn Hook>] = match route.handler() {
            HandlerRef::Method { type_name, method } => self.handlers.hooks_for(type_name, method),
            HandlerRef::Closure(_) => &[],
        };
        let hooks = route.hooks().iter().chain(registry_hooks.iter());

        for hook in hooks.clone() {
            hook.before(request, response)?;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.call_handler(route.handler(), response, request)));
        match outcome {
            Ok(result) => result?,
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                let backtrace = std::backtrace::Backtrace::capture();
                error!(
                    request_id = %request.id(),
                    handler = %route.handler().describe(),
                    panic_message = %panic_message,
                    backtrace = %backtrace,
                    "Handler panicked - CRITICAL"
                );
                return Err(HttpError::internal(format!("Handler panicked: {panic_message}"))
                    .private()
                    .with_metadata("category", "panic"));
            }
        }

        for hook in hooks {
            hook.after(request, response)?;
        }
        Ok(())
    }

    fn call_handler(&self, handler: &HandlerRef, response: &mut Response, request: &Request) -> HandlerResult {
        match handler {
            HandlerRef::Closure(f) => f(response, request),
            HandlerRef::Method { type_name, method } => {
                self.handlers.invoke(type_name, method, response, request)
            }
        }
    }

    /// Processor for responses that never reached negotiation before the handler.
    fn fallback_processor(&self, route_match: &MatchResult, request: &Request) -> Arc<dyn OutputProcessor> {
        let explicit = match route_match {
            MatchResult::Found(m) => m.route.output_name(),
            _ => None,
        };
        self.outputs
            .resolve(explicit, request.accept())
            .or_else(|_| self.outputs.resolve(None, request.accept()))
            .unwrap_or_else(|err| {
                warn!(error = %err, "Output negotiation failed; rendering JSON");
                Arc::new(JsonProcessor)
            })
    }

    /// Collapse and write the response. Returns the status written.
    fn render(
        &self,
        request: &Request,
        response: &mut Response,
        failure: Option<&HttpError>,
        processor: &dyn OutputProcessor,
        writer: &mut dyn Writer,
    ) -> u16 {
        let body = match failure {
            Some(err) => self.error_body(response, err, processor),
            None => match response.payload() {
                Payload::Raw(bytes) => bytes,
                Payload::Structured(value) => match processor.format(&value) {
                    Ok(bytes) => {
                        processor.write_content_type(response);
                        bytes
                    }
                    Err(fmt_err) => {
                        error!(
                            request_id = %request.id(),
                            processor = processor.name(),
                            error = %fmt_err,
                            "Response formatting failed"
                        );
                        let err = HttpError::from(fmt_err);
                        self.error_body(response, &err, processor)
                    }
                },
            },
        };

        let head = *request.method() == Method::HEAD;
        let bodiless = matches!(response.status(), 204 | 304);
        if head && !bodiless {
            response.set_header("Content-Length", body.len().to_string());
        }

        let wire_body: &[u8] = if head || bodiless { &[] } else { &body };
        let written = self.write_wire(response, wire_body, writer);
        if let Err(err) = written {
            error!(request_id = %request.id(), error = %err, "Writing response failed");
        }
        response.status()
    }

    fn error_body(&self, response: &mut Response, err: &HttpError, processor: &dyn OutputProcessor) -> Vec<u8> {
        response.set_status_with_phrase(err.status(), err.phrase());
        response.set_header("Content-Type", processor.content_type());
        processor
            .format_error(err, self.detailed_errors)
            .unwrap_or_else(|fmt_err| {
                error!(error = %fmt_err, processor = processor.name(), "Error formatting failed");
                response.set_header("Content-Type", "text/plain; charset=utf-8");
                format!("{} {}", err.status(), err.phrase()).into_bytes()
            })
    }

    fn write_wire(&self, response: &Response, body: &[u8], writer: &mut dyn Writer) -> std::io::Result<()> {
        writer.write_status_line(response.status(), response.phrase())?;
        let mut seen: Vec<&str> = Vec::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            let first = !seen.iter().any(|s| s.eq_ignore_ascii_case(name));
            if first {
                seen.push(name);
            }
            writer.write_header(name, value, first)?;
        }
        writer.write_body(body)?;
        writer.flush()
    }
}
