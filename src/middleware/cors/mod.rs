//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! Preflight `OPTIONS` requests from an allowed origin are answered directly
//! with `204 No Content` and the `Access-Control-*` headers; the Before phase
//! then ends with `StopProcessingOthers` so no handler runs. Simple
//! cross-origin requests continue to the handler and receive their CORS
//! headers in the After phase. Requests from origins outside the allow list
//! are rejected with 403.

mod builder;
mod error;

pub use builder::CorsMiddlewareBuilder;
pub use error::CorsConfigError;

use std::sync::Arc;

use http::Method;
use regex::Regex;
use tracing::{debug, warn};

use super::{AfterContext, BeforeContext, Middleware, MiddlewareOutcome};
use crate::error::HttpError;
use crate::server::{Request, Response, SerializationMode};

/// Origin validation strategy
#[derive(Clone)]
pub enum OriginValidation {
    /// Exact string matching
    Exact(Vec<String>),
    /// Allow all origins
    Wildcard,
    /// Regex pattern matching
    Regex(Vec<Regex>),
    /// Custom validation function
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl std::fmt::Debug for OriginValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginValidation::Exact(origins) => f.debug_tuple("Exact").field(origins).finish(),
            OriginValidation::Wildcard => write!(f, "Wildcard"),
            OriginValidation::Regex(patterns) => f
                .debug_tuple("Regex")
                .field(&patterns.iter().map(Regex::as_str).collect::<Vec<_>>())
                .finish(),
            OriginValidation::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

impl OriginValidation {
    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            OriginValidation::Exact(origins) => origins.iter().any(|o| o == origin),
            OriginValidation::Wildcard => true,
            OriginValidation::Regex(patterns) => patterns.iter().any(|re| re.is_match(origin)),
            OriginValidation::Custom(validator) => validator(origin),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, OriginValidation::Wildcard)
    }
}

/// Stateless CORS middleware; configuration is read-only after `build()`.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    pub(crate) origin_validation: OriginValidation,
    pub(crate) allowed_headers: Vec<String>,
    pub(crate) allowed_methods: Vec<Method>,
    pub(crate) allow_credentials: bool,
    pub(crate) expose_headers: Vec<String>,
    pub(crate) max_age: Option<u32>,
}

impl CorsMiddleware {
    pub fn builder() -> CorsMiddlewareBuilder {
        CorsMiddlewareBuilder::new()
    }

    /// CORS with a custom origin check.
    pub fn with_custom_validator<F>(validator: F, allowed_methods: Vec<Method>) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            origin_validation: OriginValidation::Custom(Arc::new(validator)),
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods,
            allow_credentials: false,
            expose_headers: vec![],
            max_age: None,
        }
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` if the origin is not allowed.
    fn validate_origin(&self, origin: &str) -> Option<String> {
        if !self.origin_validation.is_allowed(origin) {
            return None;
        }
        if self.origin_validation.is_wildcard() {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }

    /// Same-origin requests need no CORS headers.
    fn is_same_origin(req: &Request, origin: &str) -> bool {
        let Some(host) = req.header("host") else {
            return false;
        };
        let Some((_, origin_host_port)) = origin.split_once("://") else {
            return false;
        };
        let origin_host = origin_host_port.split(':').next().unwrap_or(origin_host_port);
        host.eq_ignore_ascii_case(origin_host) || host.eq_ignore_ascii_case(origin_host_port)
    }

    fn is_preflight(req: &Request) -> bool {
        *req.method() == Method::OPTIONS && req.header("access-control-request-method").is_some()
    }

    fn headers_allowed(&self, requested: &str) -> bool {
        if self.allowed_headers.iter().any(|h| h == "*") {
            return true;
        }
        requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .all(|h| self.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h)))
    }

    fn write_origin_headers(&self, res: &mut Response, allow_origin: &str) {
        res.set_header("Access-Control-Allow-Origin", allow_origin);
        if allow_origin != "*" {
            res.append_header("Vary", "Origin");
        }
        if self.allow_credentials {
            res.set_header("Access-Control-Allow-Credentials", "true");
        }
    }

    fn preflight(
        &self,
        req: &Request,
        res: &mut Response,
        allow_origin: &str,
    ) -> Result<MiddlewareOutcome, HttpError> {
        let requested_method = req.header("access-control-request-method").unwrap_or("");
        let method_ok = requested_method
            .parse::<Method>()
            .map(|m| self.allowed_methods.contains(&m))
            .unwrap_or(false);
        if !method_ok {
            warn!(request_id = %req.id(), method = %requested_method, "CORS preflight method not allowed");
            return Err(HttpError::forbidden("CORS method not allowed")
                .with_metadata("method", requested_method));
        }
        if let Some(requested) = req.header("access-control-request-headers") {
            if !self.headers_allowed(requested) {
                warn!(request_id = %req.id(), headers = %requested, "CORS preflight headers not allowed");
                return Err(HttpError::forbidden("CORS headers not allowed")
                    .with_metadata("headers", requested));
            }
        }

        res.set_status(204);
        res.set_mode(SerializationMode::Raw);
        res.clear_objects();
        self.write_origin_headers(res, allow_origin);
        let methods = self
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        res.set_header("Access-Control-Allow-Methods", methods);
        res.set_header("Access-Control-Allow-Headers", self.allowed_headers.join(", "));
        if let Some(max_age) = self.max_age {
            res.set_header("Access-Control-Max-Age", max_age.to_string());
        }
        debug!(request_id = %req.id(), origin = %allow_origin, "CORS preflight answered");
        Ok(MiddlewareOutcome::StopProcessingOthers)
    }
}

impl Middleware for CorsMiddleware {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let Some(origin) = ctx.request.header("origin").map(str::to_string) else {
            return Ok(MiddlewareOutcome::Continue);
        };
        if Self::is_same_origin(ctx.request, &origin) {
            return Ok(MiddlewareOutcome::Continue);
        }
        let Some(allow_origin) = self.validate_origin(&origin) else {
            warn!(request_id = %ctx.request.id(), origin = %origin, "CORS origin rejected");
            return Err(HttpError::forbidden("Origin not allowed").with_metadata("origin", origin));
        };
        if Self::is_preflight(ctx.request) {
            return self.preflight(ctx.request, ctx.response, &allow_origin);
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn after(&self, ctx: &mut AfterContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        if ctx.response.has_header("access-control-allow-origin") {
            return Ok(MiddlewareOutcome::Continue);
        }
        let Some(origin) = ctx.request.header("origin") else {
            return Ok(MiddlewareOutcome::Continue);
        };
        if Self::is_same_origin(ctx.request, origin) {
            return Ok(MiddlewareOutcome::Continue);
        }
        if let Some(allow_origin) = self.validate_origin(origin) {
            self.write_origin_headers(ctx.response, &allow_origin);
            if !self.expose_headers.is_empty() {
                ctx.response
                    .set_header("Access-Control-Expose-Headers", self.expose_headers.join(", "));
            }
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MatchResult;

    fn cors() -> CorsMiddleware {
        CorsMiddlewareBuilder::new()
            .allowed_origins(&["https://app.example.com"])
            .allowed_methods(&[Method::GET, Method::POST])
            .max_age(600)
            .build()
            .unwrap()
    }

    fn before(mw: &CorsMiddleware, mut req: Request) -> (Result<MiddlewareOutcome, HttpError>, Response) {
        let mut res = Response::new();
        let route = MatchResult::NotFound;
        let outcome = mw.before(&mut BeforeContext {
            request: &mut req,
            response: &mut res,
            route: &route,
        });
        (outcome, res)
    }

    #[test]
    fn preflight_from_allowed_origin_short_circuits() {
        let req = Request::new(Method::OPTIONS, "/items/1")
            .with_header("Origin", "https://app.example.com")
            .with_header("Access-Control-Request-Method", "POST")
            .with_header("Access-Control-Request-Headers", "content-type");
        let (outcome, res) = before(&cors(), req);
        assert_eq!(outcome.unwrap(), MiddlewareOutcome::StopProcessingOthers);
        assert_eq!(res.status(), 204);
        assert_eq!(res.header("access-control-allow-origin"), Some("https://app.example.com"));
        assert_eq!(res.header("access-control-allow-methods"), Some("GET, POST"));
        assert_eq!(res.header("access-control-max-age"), Some("600"));
    }

    #[test]
    fn preflight_with_disallowed_method_is_forbidden() {
        let req = Request::new(Method::OPTIONS, "/items/1")
            .with_header("Origin", "https://app.example.com")
            .with_header("Access-Control-Request-Method", "DELETE");
        let (outcome, _) = before(&cors(), req);
        assert_eq!(outcome.unwrap_err().status(), 403);
    }

    #[test]
    fn unknown_origin_is_forbidden_and_same_origin_passes() {
        let req = Request::new(Method::GET, "/").with_header("Origin", "https://evil.test");
        assert_eq!(before(&cors(), req).0.unwrap_err().status(), 403);

        let req = Request::new(Method::GET, "/")
            .with_header("Origin", "http://localhost:8080")
            .with_header("Host", "localhost:8080");
        assert_eq!(before(&cors(), req).0.unwrap(), MiddlewareOutcome::Continue);
    }

    #[test]
    fn regex_and_custom_validation() {
        let mw = CorsMiddlewareBuilder::new()
            .origin_patterns(&[r"^https://[a-z]+\.example\.com$"])
            .build()
            .unwrap();
        assert!(mw.validate_origin("https://shop.example.com").is_some());
        assert!(mw.validate_origin("https://example.org").is_none());

        let mw = CorsMiddleware::with_custom_validator(|o| o.ends_with(".internal"), vec![Method::GET]);
        assert!(mw.validate_origin("http://svc.internal").is_some());
    }
}
