//! # Middleware Module
//!
//! Ordered before/after interceptors with two-tier early-exit semantics.
//!
//! Each [`Middleware`] returns a [`MiddlewareOutcome`] per phase. The
//! [`MiddlewareChain`] folds those into one result per phase:
//!
//! - `Continue` leaves the aggregate unchanged
//! - `StopProcessing` vetoes the handler; later middleware still run
//! - `StopProcessingOthers` ends the phase immediately
//!
//! A registration may be scoped to paths matching a regex anchored at the
//! start of the path.
//!
//! ## Included middleware
//!
//! - [`CorsMiddleware`] - preflight answers and `Access-Control-*` headers
//! - [`AuthTokenMiddleware`] / [`ClaimGuard`] - credential parsing and claim checks
//! - [`StaticFileMiddleware`] - file fallback for unmatched `GET`/`HEAD`
//! - [`MetricsMiddleware`] - atomic request counters
//! - [`TracingMiddleware`] - per-request span

mod auth;
mod core;
mod cors;
mod metrics;
mod static_files;
mod tracing;

pub use self::auth::{AuthTokenMiddleware, ClaimGuard};
pub use self::core::{
    AfterContext, BeforeContext, Middleware, MiddlewareChain, MiddlewareOutcome,
    MiddlewareRegistration,
};
pub use self::cors::{CorsConfigError, CorsMiddleware, CorsMiddlewareBuilder, OriginValidation};
pub use self::metrics::{MetricsMiddleware, MetricsSnapshot};
pub use self::static_files::StaticFileMiddleware;
pub use self::tracing::TracingMiddleware;
