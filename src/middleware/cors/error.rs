use thiserror::Error;

/// CORS configuration error
///
/// Returned by `CorsMiddlewareBuilder::build()` when the configuration
/// is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials.
    #[error(
        "CORS configuration error: Cannot use wildcard origin (*) with credentials. \
         When allow_credentials is true, you must specify exact origins."
    )]
    WildcardWithCredentials,

    /// Origin is not of the form `scheme://host[:port]`.
    #[error(
        "CORS configuration error: Invalid origin format '{origin}'. \
         Expected format: scheme://host:port (e.g., https://example.com)"
    )]
    InvalidOriginFormat { origin: String },

    /// Credentials with no origin to return them to.
    #[error(
        "CORS configuration error: Cannot use credentials with empty origins list. \
         When allow_credentials is true, at least one origin must be specified."
    )]
    EmptyOriginsWithCredentials,

    #[error("CORS configuration error: Invalid origin pattern '{pattern}': {reason}")]
    InvalidOriginPattern { pattern: String, reason: String },

    #[error("CORS configuration error: Unknown HTTP method '{method}'")]
    InvalidMethod { method: String },
}
