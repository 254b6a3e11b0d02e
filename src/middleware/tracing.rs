use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{field, info, info_span, Span};

use super::{AfterContext, BeforeContext, Middleware, MiddlewareOutcome};
use crate::error::HttpError;
use crate::router::MatchResult;

const SPAN_KEY_ATTRIBUTE: &str = "tracing.span_key";

/// Opens a `request` span in Before and closes it in After with the final
/// status and latency recorded.
///
/// Spans of in-flight requests are kept in a concurrent map under a key
/// minted per dispatch, so requests sharing an inbound `X-Request-Id` keep
/// separate spans.
#[derive(Debug, Default)]
pub struct TracingMiddleware {
    next_key: AtomicU64,
    spans: DashMap<u64, Span>,
}

impl TracingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests whose After phase has not run yet.
    pub fn in_flight(&self) -> usize {
        self.spans.len()
    }
}

impl Middleware for TracingMiddleware {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let handler = match ctx.route {
            MatchResult::Found(m) => m.route.handler().describe(),
            _ => "-".to_string(),
        };
        let span = info_span!(
            "request",
            request_id = %ctx.request.id(),
            method = %ctx.request.method(),
            path = %ctx.request.path(),
            handler = %handler,
            status = field::Empty,
            latency_us = field::Empty,
        );
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        ctx.request.set_attribute(SPAN_KEY_ATTRIBUTE, key);
        self.spans.insert(key, span);
        Ok(MiddlewareOutcome::Continue)
    }

    fn after(&self, ctx: &mut AfterContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let status = ctx.error.map_or(ctx.response.status(), HttpError::status);
        let latency_us = u64::try_from(ctx.latency.as_micros()).unwrap_or(u64::MAX);
        let Some(key) = ctx.request.attribute(SPAN_KEY_ATTRIBUTE).and_then(|v| v.as_u64()) else {
            return Ok(MiddlewareOutcome::Continue);
        };
        if let Some((_, span)) = self.spans.remove(&key) {
            span.record("status", status);
            span.record("latency_us", latency_us);
            span.in_scope(|| info!(status, latency_us, "Request finished"));
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
