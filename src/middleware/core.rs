use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::error::HttpError;
use crate::router::MatchResult;
use crate::server::{Request, Response};

/// Per-middleware signal returned from `before` and `after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiddlewareOutcome {
    #[default]
    Continue,
    /// Veto the handler but let the rest of this phase run.
    StopProcessing,
    /// End this phase immediately.
    StopProcessingOthers,
}

impl MiddlewareOutcome {
    pub fn is_stop(self) -> bool {
        !matches!(self, MiddlewareOutcome::Continue)
    }
}

/// State visible to Before middleware.
pub struct BeforeContext<'a> {
    pub request: &'a mut Request,
    pub response: &'a mut Response,
    /// Match outcome, including `NotFound` and `MethodNotAllowed`.
    pub route: &'a MatchResult,
}

/// State visible to After middleware.
pub struct AfterContext<'a> {
    pub request: &'a Request,
    pub response: &'a mut Response,
    pub route: &'a MatchResult,
    /// Identity of the matched handler, e.g. `Pets::show`.
    pub handler: Option<&'a str>,
    /// Error raised so far. After middleware can observe it but not clear it.
    pub error: Option<&'a HttpError>,
    pub latency: Duration,
}

/// Before/after interceptor shared by every in-flight request.
///
/// Implementations holding mutable state must synchronise it themselves.
pub trait Middleware: Send + Sync {
    fn before(&self, _ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        Ok(MiddlewareOutcome::Continue)
    }

    fn after(&self, _ctx: &mut AfterContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        Ok(MiddlewareOutcome::Continue)
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A middleware plus where and when it applies.
#[derive(Clone)]
pub struct MiddlewareRegistration {
    middleware: Arc<dyn Middleware>,
    scope: Option<Regex>,
    before: bool,
    after: bool,
}

impl std::fmt::Debug for MiddlewareRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistration")
            .field("middleware", &self.middleware.name())
            .field("scope", &self.scope.as_ref().map(Regex::as_str))
            .field("before", &self.before)
            .field("after", &self.after)
            .finish()
    }
}

impl MiddlewareRegistration {
    /// Applies to every path in both phases.
    pub fn new(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            middleware,
            scope: None,
            before: true,
            after: true,
        }
    }

    /// Restrict to request paths matching `pattern` from their first character.
    pub fn scoped(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.scope = Some(Regex::new(&format!("^(?:{pattern})"))?);
        Ok(self)
    }

    #[must_use]
    pub fn before_only(mut self) -> Self {
        self.before = true;
        self.after = false;
        self
    }

    #[must_use]
    pub fn after_only(mut self) -> Self {
        self.before = false;
        self.after = true;
        self
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.scope.as_ref().map_or(true, |re| re.is_match(path))
    }
}

/// Ordered middleware list with the two-tier stop semantics.
///
/// For each phase the aggregate starts at `Continue`. `StopProcessingOthers`
/// ends the phase at once and is returned. `StopProcessing` is remembered and
/// returned once every remaining applicable middleware has run. An error
/// ends the phase and is returned.
#[derive(Clone, Default, Debug)]
pub struct MiddlewareChain {
    entries: Vec<MiddlewareRegistration>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, registration: MiddlewareRegistration) {
        self.entries.push(registration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn run_before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let mut aggregate = MiddlewareOutcome::Continue;
        for entry in self.entries.iter().filter(|e| e.before) {
            if !entry.applies_to(ctx.request.path()) {
                continue;
            }
            match entry.middleware.before(ctx)? {
                MiddlewareOutcome::StopProcessingOthers => {
                    debug!(
                        request_id = %ctx.request.id(),
                        middleware = entry.middleware.name(),
                        "Before phase stopped by middleware"
                    );
                    return Ok(MiddlewareOutcome::StopProcessingOthers);
                }
                MiddlewareOutcome::StopProcessing => {
                    debug!(
                        request_id = %ctx.request.id(),
                        middleware = entry.middleware.name(),
                        "Middleware vetoed handler"
                    );
                    aggregate = MiddlewareOutcome::StopProcessing;
                }
                MiddlewareOutcome::Continue => {}
            }
        }
        Ok(aggregate)
    }

    pub fn run_after(&self, ctx: &mut AfterContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let mut aggregate = MiddlewareOutcome::Continue;
        for entry in self.entries.iter().filter(|e| e.after) {
            if !entry.applies_to(ctx.request.path()) {
                continue;
            }
            match entry.middleware.after(ctx)? {
                MiddlewareOutcome::StopProcessingOthers => {
                    return Ok(MiddlewareOutcome::StopProcessingOthers)
                }
                MiddlewareOutcome::StopProcessing => aggregate = MiddlewareOutcome::StopProcessing,
                MiddlewareOutcome::Continue => {}
            }
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        outcome: MiddlewareOutcome,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Recorder {
        fn before(&self, _ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
            self.log.lock().unwrap().push(self.label);
            Ok(self.outcome)
        }
    }

    fn chain(
        specs: &[(&'static str, MiddlewareOutcome, Option<&str>)],
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        for (label, outcome, scope) in specs {
            let mw = Arc::new(Recorder {
                label: *label,
                outcome: *outcome,
                log: Arc::clone(log),
            });
            let mut reg = MiddlewareRegistration::new(mw);
            if let Some(scope) = scope {
                reg = reg.scoped(scope).unwrap();
            }
            chain.push(reg);
        }
        chain
    }

    fn run(chain: &MiddlewareChain, path: &str) -> MiddlewareOutcome {
        let mut request = Request::new(Method::GET, path);
        let mut response = Response::new();
        let route = MatchResult::NotFound;
        let mut ctx = BeforeContext {
            request: &mut request,
            response: &mut response,
            route: &route,
        };
        chain.run_before(&mut ctx).unwrap()
    }

    #[test]
    fn stop_processing_lets_later_middleware_run() {
        use MiddlewareOutcome::*;
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            &[("a", Continue, None), ("b", StopProcessing, None), ("c", Continue, None)],
            &log,
        );
        assert_eq!(run(&chain, "/"), StopProcessing);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn stop_processing_others_ends_phase() {
        use MiddlewareOutcome::*;
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            &[
                ("a", StopProcessing, None),
                ("b", StopProcessingOthers, None),
                ("c", Continue, None),
            ],
            &log,
        );
        assert_eq!(run(&chain, "/"), StopProcessingOthers);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn scope_restricts_by_path_prefix() {
        use MiddlewareOutcome::*;
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            &[("admin", StopProcessing, Some("/admin.*")), ("all", Continue, None)],
            &log,
        );
        assert_eq!(run(&chain, "/public/admin"), Continue);
        assert_eq!(run(&chain, "/admin/stats"), StopProcessing);
        assert_eq!(*log.lock().unwrap(), vec!["all", "admin", "all"]);
    }
}
