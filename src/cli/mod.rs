//! # CLI Module
//!
//! Command-line access to schema-derived route tables.
//!
//! ## Commands
//!
//! ### `routes`
//!
//! Print the derived route table in match order:
//!
//! ```bash
//! brrtdispatch routes --spec openapi.yaml
//! ```
//!
//! ### `probe`
//!
//! Dispatch one request through the full lifecycle, with every controller
//! type replaced by an echo controller, and print the raw HTTP/1.1 response:
//!
//! ```bash
//! brrtdispatch probe --spec openapi.yaml --method GET --path /pets/42 --accept application/xml
//! ```
//!
//! Both commands accept `--config <FILE>` (or `BRRTD_CONFIG`) pointing at an
//! engine configuration file.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, run_cli_with_output, Cli, Commands};
