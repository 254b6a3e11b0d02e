//! # Router Module
//!
//! Route registration and matching.
//!
//! ## Overview
//!
//! A [`RouteTable`] is an ordered list of [`Route`]s. Each route carries a
//! verb set, a path pattern, a [`HandlerRef`] (closure or `Type::method`
//! reference), an optional output processor name and an ordered hook list.
//!
//! The table compiles into a [`Matcher`]. The built-in [`RegexMatcher`]
//! converts every pattern to an anchored regex and returns the first route
//! whose path and verb both match:
//!
//! - path and verb match: [`MatchResult::Found`] with the extracted variables
//! - path matches but no route accepts the verb:
//!   [`MatchResult::MethodNotAllowed`] listing the verbs that would
//! - otherwise [`MatchResult::NotFound`]
//!
//! Precedence between overlapping patterns is registration order only.
//!
//! ## Patterns
//!
//! - `{name}` matches one path segment
//! - `{name:regex}` matches `regex`, e.g. `/items/{id:\d+}`
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtdispatch::router::{Route, RouteTable, Matcher, MatchResult};
//! use http::Method;
//!
//! let table = RouteTable::new().with_route(Route::get("/items/{id}", |res, req| {
//!     res.write(&serde_json::json!({ "id": req.param_str("id") }))
//! }));
//! let matcher = table.compile()?;
//! assert!(matches!(matcher.match_route(&Method::GET, "/items/42"), MatchResult::Found(_)));
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use core::{
    HandlerFn, HandlerRef, MatchResult, Matcher, ParamVec, RegexMatcher, Route, RouteMatch,
    RouteTable, MAX_INLINE_PARAMS,
};
