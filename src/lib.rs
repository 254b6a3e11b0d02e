//! # brrtdispatch
//!
//! **brrtdispatch** is the request lifecycle engine of an OpenAPI driven HTTP
//! service: it matches a request to a handler, runs ordered before/after
//! middleware with early-exit semantics, invokes the handler, negotiates an
//! output format and turns typed errors into structured responses.
//!
//! ## Architecture
//!
//! - **[`router`]** - route table, `{name}` / `{name:regex}` patterns and the first-match matcher
//! - **[`output`]** - output processors (JSON, XML, CSV, YAML, text) and content negotiation
//! - **[`error`]** - typed HTTP errors, handler resolution and schema errors
//! - **[`middleware`]** - the before/after chain plus CORS, auth, static file, metrics and tracing middleware
//! - **[`server`]** - request/response model and the `Writer` collaborators
//! - **[`dispatcher`]** - the lifecycle engine and the `Type::method` handler registry
//! - **[`spec`]** - route tables derived from OpenAPI / Swagger documents
//! - **[`security`]** - credential parsing collaborators and claim checks
//! - **[`config`]** / **[`logging`]** - engine configuration and tracing setup
//!
//! ## Request lifecycle
//!
//! ```text
//! Matching -> Before middleware -> { Invoking | short-circuit } -> After middleware -> Rendering
//! ```
//!
//! Any stage may raise an [`error::HttpError`]; it is rendered with the
//! negotiated processor's error formatter as `{type, code, message, metadata?, trace?}`.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use brrtdispatch::dispatcher::Dispatcher;
//! use brrtdispatch::middleware::CorsMiddlewareBuilder;
//! use brrtdispatch::router::{Route, RouteTable};
//! use brrtdispatch::server::{BufferedWriter, Request};
//! use http::Method;
//!
//! let table = RouteTable::new()
//!     .with_route(Route::get("/items/{id:\\d+}", |res, req| {
//!         res.write(&serde_json::json!({ "id": req.param_str("id") }))
//!     }));
//!
//! let mut dispatcher = Dispatcher::from_table(&table).unwrap();
//! dispatcher.add_middleware(Arc::new(
//!     CorsMiddlewareBuilder::new()
//!         .allowed_origins(&["https://app.example.com"])
//!         .build()
//!         .unwrap(),
//! ));
//!
//! let mut out = BufferedWriter::new();
//! let req = Request::new(Method::GET, "/items/42").with_header("Accept", "application/xml");
//! let outcome = dispatcher.handle(req, &mut out);
//! assert_eq!(outcome.status, 200);
//! assert!(out.body_str().contains("<id>42</id>"));
//! ```

pub mod cli;
pub mod config;
pub mod dispatcher;
mod echo;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod output;
pub mod router;
pub mod security;
pub mod server;
pub mod spec;

pub use echo::{register_echo_controllers, EchoController};
