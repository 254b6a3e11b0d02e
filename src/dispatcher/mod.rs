//! # Dispatcher Module
//!
//! The dispatcher drives one request through its lifecycle:
//!
//! 1. **Matching** - the current [`Matcher`](crate::router::Matcher) classifies
//!    the request as found, not found, method not allowed or indeterminate.
//!    Path variables are appended to the request's route namespace.
//! 2. **Before middleware** - every applicable middleware runs in
//!    registration order. `StopProcessing` vetoes the handler but lets the
//!    rest of the phase run; `StopProcessingOthers` ends the phase at once.
//! 3. **Invoking** - an output processor is negotiated, route hooks run, then
//!    the handler (a closure or a `Type::method` resolved through the
//!    [`HandlerRegistry`]). Panics are caught and become a private 500.
//! 4. **After middleware** - always runs, with the handler identity, latency
//!    and any error raised so far.
//! 5. **Rendering** - the written objects are collapsed per the response's
//!    serialization mode and written through the negotiated processor. Errors
//!    are rendered with that processor's error formatter.
//!
//! ## Example
//!
//! ```rust
//! use brrtdispatch::dispatcher::Dispatcher;
//! use brrtdispatch::router::{Route, RouteTable};
//! use brrtdispatch::server::{BufferedWriter, Request};
//! use http::Method;
//!
//! let table = RouteTable::new().with_route(Route::get("/items/{id}", |res, req| {
//!     res.write(&serde_json::json!({ "id": req.param_str("id") }))
//! }));
//! let dispatcher = Dispatcher::from_table(&table).unwrap();
//!
//! let mut out = BufferedWriter::new();
//! let outcome = dispatcher.handle(Request::new(Method::GET, "/items/42"), &mut out);
//! assert_eq!(outcome.status, 200);
//! assert_eq!(out.body_json(), serde_json::json!({ "id": "42" }));
//! ```

mod core;
mod handler;

pub use self::core::{DispatchOutcome, Dispatcher};
pub use handler::{
    Controller, ControllerFactory, HandlerRegistry, HandlerResult, Hook, MethodTable,
};
