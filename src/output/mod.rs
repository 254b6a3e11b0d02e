//! # Output Module
//!
//! Content negotiation and wire formatting.
//!
//! An [`OutputProcessor`] bundles a body formatter, an error formatter and the
//! `Content-Type` it writes. The [`OutputRegistry`] maps processor names and
//! mime types to processors and implements negotiation:
//!
//! 1. the processor named by the matched route
//! 2. the registry default
//! 3. the first entry of the `Accept` header, looked up in the mime table
//! 4. JSON
//!
//! Every processor receives the same format-neutral payload produced by
//! [`crate::server::Response::payload`], and every error formatter renders the
//! same envelope (see [`error_envelope`]).

mod core;
mod csv;
mod json;
mod text;
mod xml;
mod yaml;

pub use self::core::{error_envelope, normalize_mime, OutputProcessor, OutputRegistry, FALLBACK_PROCESSOR};
pub use self::csv::CsvProcessor;
pub use self::json::JsonProcessor;
pub use self::text::TextProcessor;
pub use self::xml::XmlProcessor;
pub use self::yaml::YamlProcessor;
