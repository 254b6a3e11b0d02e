use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::dispatcher::Hook;
use crate::error::{HttpError, SchemaError};
use crate::server::{Request, Response};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated path parameter storage for the hot path.
///
/// Names come from the compiled route table and are shared; values are
/// per-request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Handler closure signature.
pub type HandlerFn = Arc<dyn Fn(&mut Response, &Request) -> Result<(), HttpError> + Send + Sync>;

const SLOW_MATCH: Duration = Duration::from_millis(1);

/// The code behind a route.
#[derive(Clone)]
pub enum HandlerRef {
    /// Called directly with the response accumulator and request.
    Closure(HandlerFn),
    /// Resolved at dispatch time through the handler registry.
    Method { type_name: String, method: String },
}

impl HandlerRef {
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&mut Response, &Request) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        HandlerRef::Closure(Arc::new(f))
    }

    pub fn method(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        HandlerRef::Method {
            type_name: type_name.into(),
            method: method.into(),
        }
    }

    /// Identity used in logs and After-middleware, e.g. `Pets::show`.
    pub fn describe(&self) -> String {
        match self {
            HandlerRef::Closure(_) => "<closure>".to_string(),
            HandlerRef::Method { type_name, method } => format!("{type_name}::{method}"),
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Closure(_) => f.write_str("Closure(<fn>)"),
            HandlerRef::Method { type_name, method } => f
                .debug_struct("Method")
                .field("type_name", type_name)
                .field("method", method)
                .finish(),
        }
    }
}

/// A registered (methods, pattern, handler, output processor) entry.
///
/// Immutable once it is in a [`RouteTable`].
#[derive(Clone)]
pub struct Route {
    methods: Vec<Method>,
    pattern: String,
    handler: HandlerRef,
    output: Option<String>,
    name: Option<String>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("handler", &self.handler)
            .field("output", &self.output)
            .field("name", &self.name)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

macro_rules! verb_helpers {
    ($($fn_name:ident => $method:expr),* $(,)?) => {
        $(
            pub fn $fn_name<F>(pattern: impl Into<String>, handler: F) -> Self
            where
                F: Fn(&mut Response, &Request) -> Result<(), HttpError> + Send + Sync + 'static,
            {
                Self::new([$method], pattern, HandlerRef::closure(handler))
            }
        )*
    };
}

impl Route {
    /// Route for `methods`; an empty method list accepts every verb.
    pub fn new(
        methods: impl IntoIterator<Item = Method>,
        pattern: impl Into<String>,
        handler: HandlerRef,
    ) -> Self {
        let mut pattern = pattern.into();
        if pattern.is_empty() {
            pattern.push('/');
        }
        Self {
            methods: methods.into_iter().collect(),
            pattern,
            handler,
            output: None,
            name: None,
            hooks: Vec::new(),
        }
    }

    verb_helpers! {
        get => Method::GET,
        post => Method::POST,
        put => Method::PUT,
        patch => Method::PATCH,
        delete => Method::DELETE,
        options => Method::OPTIONS,
        head => Method::HEAD,
    }

    /// Closure route accepting every method.
    pub fn any<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Response, &Request) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        Self::new(Vec::<Method>::new(), pattern, HandlerRef::closure(handler))
    }

    /// Pin the output processor for this route.
    #[must_use]
    pub fn output(mut self, processor: impl Into<String>) -> Self {
        self.output = Some(processor.into());
        self
    }

    /// Stable identifier, e.g. an operation id.
    #[must_use]
    pub fn name(mut self, id: impl Into<String>) -> Self {
        self.name = Some(id.into());
        self
    }

    /// Attach a hook; hooks run in attachment order around the handler.
    #[must_use]
    pub fn hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn hook_arc(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    /// Whether this route serves `method`. `HEAD` is served by `GET` routes.
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty()
            || self.methods.contains(method)
            || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    fn methods_label(&self) -> String {
        if self.methods.is_empty() {
            return "*".to_string();
        }
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Successful match: the route plus extracted path variables.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: ParamVec,
}

impl RouteMatch {
    /// Path variable by name; the last occurrence wins on duplicates.
    #[inline]
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of matching a method and path.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Found(RouteMatch),
    NotFound,
    /// The path exists but not for this method; carries the methods it does
    /// accept.
    MethodNotAllowed(Vec<Method>),
    /// A matcher state the dispatcher cannot interpret. Rendered as 520.
    Indeterminate(String),
}

/// Pluggable route matcher. Must be safe for concurrent reads.
pub trait Matcher: Send + Sync {
    fn match_route(&self, method: &Method, path: &str) -> MatchResult;

    /// Routes in match order.
    fn routes(&self) -> Vec<Arc<Route>>;
}

/// Ordered collection of routes. Registration order is match order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: Route) -> &mut Self {
        self.routes.push(Arc::new(route));
        self
    }

    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.register(route);
        self
    }

    pub fn extend(&mut self, routes: impl IntoIterator<Item = Route>) {
        self.routes.extend(routes.into_iter().map(Arc::new));
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compile into the default regex matcher.
    pub fn compile(&self) -> Result<RegexMatcher, SchemaError> {
        RegexMatcher::new(self)
    }

    /// One line per route: `GET /pets/{id} -> Pets::show [json]`.
    pub fn dump(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| {
                let mut line = format!("{} {} -> {}", r.methods_label(), r.pattern, r.handler.describe());
                if let Some(output) = r.output_name() {
                    line.push_str(&format!(" [{output}]"));
                }
                line
            })
            .collect()
    }
}

impl FromIterator<Route> for RouteTable {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        let mut table = RouteTable::new();
        table.extend(iter);
        table
    }
}

struct CompiledRoute {
    route: Arc<Route>,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

/// Linear first-match matcher over compiled route patterns.
pub struct RegexMatcher {
    entries: Vec<CompiledRoute>,
}

impl fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.regex.as_str()))
            .finish()
    }
}

impl RegexMatcher {
    pub fn new(table: &RouteTable) -> Result<Self, SchemaError> {
        let entries = table
            .routes()
            .iter()
            .map(|route| {
                let (regex, param_names) = path_to_regex(route.pattern())?;
                Ok(CompiledRoute {
                    route: Arc::clone(route),
                    regex,
                    param_names,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let routes_summary: Vec<String> = entries
            .iter()
            .take(10)
            .map(|e| format!("{} {}", e.route.methods_label(), e.route.pattern()))
            .collect();
        info!(
            routes_count = entries.len(),
            routes_summary = ?routes_summary,
            "Routing table loaded"
        );

        Ok(Self { entries })
    }
}

impl Matcher for RegexMatcher {
    fn match_route(&self, method: &Method, path: &str) -> MatchResult {
        debug!(method = %method, path = %path, "Route match attempt");
        let started = Instant::now();
        let mut allowed: Vec<Method> = Vec::new();

        for entry in &self.entries {
            let Some(caps) = entry.regex.captures(path) else {
                continue;
            };
            if !entry.route.allows(method) {
                for m in entry.route.methods() {
                    if !allowed.contains(m) {
                        allowed.push(m.clone());
                    }
                }
                continue;
            }

            let mut params = ParamVec::new();
            for (idx, name) in entry.param_names.iter().enumerate() {
                if let Some(value) = caps.get(idx + 1) {
                    params.push((Arc::clone(name), value.as_str().to_string()));
                }
            }

            let elapsed = started.elapsed();
            if elapsed > SLOW_MATCH {
                warn!(
                    method = %method,
                    path = %path,
                    route_pattern = %entry.route.pattern(),
                    duration_us = elapsed.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    handler = %entry.route.handler().describe(),
                    route_pattern = %entry.route.pattern(),
                    path_params = ?params,
                    duration_us = elapsed.as_micros(),
                    "Route matched"
                );
            }
            return MatchResult::Found(RouteMatch {
                route: Arc::clone(&entry.route),
                params,
            });
        }

        if !allowed.is_empty() {
            warn!(method = %method, path = %path, allowed = ?allowed, "Method not allowed");
            return MatchResult::MethodNotAllowed(allowed);
        }

        warn!(
            method = %method,
            path = %path,
            duration_us = started.elapsed().as_micros(),
            "No route matched"
        );
        MatchResult::NotFound
    }

    fn routes(&self) -> Vec<Arc<Route>> {
        self.entries.iter().map(|e| Arc::clone(&e.route)).collect()
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Convert a route pattern to an anchored regex and its parameter names.
///
/// `{name}` matches one path segment; `{name:regex}` matches `regex`
/// (braces inside the regex are allowed when balanced). Literal text is
/// escaped. Parameters are captured positionally so user regexes must not
/// contain capturing groups; use `(?:...)` instead.
pub(crate) fn path_to_regex(pattern: &str) -> Result<(Regex, Vec<Arc<str>>), SchemaError> {
    let mut regex_src = String::with_capacity(pattern.len() + 8);
    regex_src.push('^');
    let mut names: Vec<Arc<str>> = Vec::with_capacity(pattern.matches('{').count());
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                regex_src.push_str(&regex::escape(&literal));
                literal.clear();

                let mut depth = 1;
                let mut inner = String::new();
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    inner.push(c);
                }
                if depth != 0 {
                    return Err(invalid(pattern, "unclosed '{'"));
                }

                let (name, custom) = match inner.split_once(':') {
                    Some((name, re)) => (name.trim(), Some(re)),
                    None => (inner.trim(), None),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                    return Err(invalid(pattern, format!("invalid parameter name '{name}'")));
                }
                let body = match custom {
                    Some(re) => {
                        let probe = Regex::new(re).map_err(|e| invalid(pattern, e.to_string()))?;
                        if probe.captures_len() > 1 {
                            return Err(invalid(
                                pattern,
                                format!("parameter '{name}' regex must not contain capturing groups"),
                            ));
                        }
                        re.to_string()
                    }
                    None => "[^/]+".to_string(),
                };
                regex_src.push('(');
                regex_src.push_str(&body);
                regex_src.push(')');
                names.push(Arc::from(name));
            }
            '}' => return Err(invalid(pattern, "unmatched '}'")),
            other => literal.push(other),
        }
    }
    regex_src.push_str(&regex::escape(&literal));
    regex_src.push('$');

    let regex = Regex::new(&regex_src).map_err(|e| invalid(pattern, e.to_string()))?;
    Ok((regex, names))
}
