//! # Server Module
//!
//! Per-request data model and the writer seam.
//!
//! - [`Request`] groups the server, cookie, session, body, query and route
//!   namespaces behind one precedence-ordered lookup. The body is fetched on
//!   first access.
//! - [`Response`] accumulates status, ordered headers and written objects,
//!   and collapses them into one [`Payload`] according to its
//!   [`SerializationMode`].
//! - [`Writer`] receives the rendered status line, headers and body.
//!   [`BufferedWriter`] keeps them in memory and [`Http1Writer`] frames them
//!   as HTTP/1.1 on any `io::Write`.

pub mod request;
pub mod response;
pub mod writer;

pub use request::{parse_cookies, parse_query_params, BodyFetcher, Namespace, Request};
pub use response::{Payload, Response, SerializationMode, WrittenObject};
pub use writer::{BufferedWriter, Http1Writer, Writer};
