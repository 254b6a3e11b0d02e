//! # Spec Module
//!
//! Derives route tables from OpenAPI 3 / Swagger 2 documents.
//!
//! - [`load_schema`] reads a YAML or JSON file into a [`SchemaDocument`]
//! - [`build_routes`] sorts the paths, parses each `operationId` into a
//!   `Type::method` handler reference and resolves the output processor
//! - [`RouteCache`] keeps derived tables per file until it changes

mod build;
mod cache;
mod load;

pub use build::{build_routes, parse_operation_id, sort_paths, BuildOptions};
pub use cache::RouteCache;
pub use load::{load_schema, SchemaDocument, SchemaOperation};
