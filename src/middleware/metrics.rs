use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{AfterContext, BeforeContext, Middleware, MiddlewareOutcome};
use crate::error::HttpError;
use crate::router::MatchResult;

/// Request counters shared across every in-flight request.
///
/// All counters are atomics updated with `Ordering::Relaxed`; values are
/// eventually consistent.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    unmatched: AtomicUsize,
    client_errors: AtomicUsize,
    server_errors: AtomicUsize,
    auth_failures: AtomicUsize,
}

/// Point-in-time copy of [`MetricsMiddleware`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub requests: usize,
    pub unmatched: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    pub auth_failures: usize,
    pub average_latency: Duration,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of requests seen by the Before phase.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean latency over all requests that reached the After phase.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.request_count(),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            average_latency: self.average_latency(),
        }
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !matches!(ctx.route, MatchResult::Found(_)) {
            self.unmatched.fetch_add(1, Ordering::Relaxed);
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn after(&self, ctx: &mut AfterContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let latency_ns = u64::try_from(ctx.latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);

        let status = ctx.error.map_or(ctx.response.status(), HttpError::status);
        match status {
            401 | 403 => {
                self.auth_failures.fetch_add(1, Ordering::Relaxed);
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
