//! # Error Module
//!
//! Typed failures of the request lifecycle.
//!
//! - [`HttpError`] is the request-level taxonomy: one [`HttpErrorKind`] per
//!   supported status code plus a custom escape hatch. Handlers, hooks and
//!   middleware return it; the dispatcher renders it through the negotiated
//!   output processor.
//! - [`HandlerResolutionError`] means a route points at code that does not
//!   exist. It is a configuration fault and always renders as a 500.
//! - [`SchemaError`] covers malformed route schemas and route patterns. It is
//!   fatal at route table build time.
//! - [`OutputError`] covers processor resolution and formatting failures.

mod dispatch;
mod status;

pub use dispatch::{HandlerResolutionError, OutputError, SchemaError};
pub use status::{humanize_type_name, status_phrase, HttpError, HttpErrorKind, STATUS_CODE_RANGE};
