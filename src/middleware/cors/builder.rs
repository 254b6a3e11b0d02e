use http::Method;
use regex::Regex;

use super::{CorsConfigError, CorsMiddleware, OriginValidation};

/// Builder for creating `CorsMiddleware` with a fluent API
///
/// # Example
///
/// ```rust
/// use brrtdispatch::middleware::CorsMiddlewareBuilder;
/// use http::Method;
///
/// let cors = CorsMiddlewareBuilder::new()
///     .allowed_origins(&["https://example.com", "https://api.example.com"])
///     .allowed_methods(&[Method::GET, Method::POST, Method::PUT])
///     .allowed_headers(&["Content-Type", "Authorization", "X-Custom-Header"])
///     .allow_credentials(true)
///     .expose_headers(&["X-Total-Count"])
///     .max_age(3600)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddlewareBuilder {
    allowed_origins: Vec<String>,
    origin_patterns: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl CorsMiddlewareBuilder {
    /// Create a new builder with secure defaults
    ///
    /// Default configuration:
    /// - No origins allowed
    /// - Headers: `Content-Type`, `Authorization`
    /// - Methods: `GET, POST, PUT, DELETE, OPTIONS`
    /// - No credentials, no exposed headers, no preflight caching
    pub fn new() -> Self {
        Self {
            allowed_origins: vec![],
            origin_patterns: vec![],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_credentials: false,
            expose_headers: vec![],
            max_age: None,
        }
    }

    /// Set allowed origins. `&["*"]` allows every origin.
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.allowed_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Allow origins matching any of these regex patterns.
    ///
    /// Takes precedence over `allowed_origins` when non-empty.
    pub fn origin_patterns(mut self, patterns: &[&str]) -> Self {
        self.origin_patterns = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods.to_vec();
        self
    }

    /// Set allowed request headers. `&["*"]` allows any header.
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Send `Access-Control-Allow-Credentials: true`.
    ///
    /// Cannot be combined with a wildcard origin.
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Headers readable by scripts on the calling origin.
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.expose_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Preflight cache duration in seconds.
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Validate the configuration and build the middleware.
    ///
    /// # Errors
    ///
    /// - `WildcardWithCredentials` if credentials are enabled with `*`
    /// - `EmptyOriginsWithCredentials` if credentials are enabled with no origins
    /// - `InvalidOriginFormat` for an exact origin without `scheme://host`
    /// - `InvalidOriginPattern` for a pattern that does not compile
    pub fn build(self) -> Result<CorsMiddleware, CorsConfigError> {
        let origin_validation = if !self.origin_patterns.is_empty() {
            let patterns = self
                .origin_patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| CorsConfigError::InvalidOriginPattern {
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            OriginValidation::Regex(patterns)
        } else if self.allowed_origins.iter().any(|o| o == "*") {
            OriginValidation::Wildcard
        } else {
            for origin in &self.allowed_origins {
                if !is_valid_origin(origin) {
                    return Err(CorsConfigError::InvalidOriginFormat {
                        origin: origin.clone(),
                    });
                }
            }
            OriginValidation::Exact(self.allowed_origins)
        };

        if self.allow_credentials {
            if origin_validation.is_wildcard() {
                return Err(CorsConfigError::WildcardWithCredentials);
            }
            if matches!(&origin_validation, OriginValidation::Exact(o) if o.is_empty()) {
                return Err(CorsConfigError::EmptyOriginsWithCredentials);
            }
        }

        Ok(CorsMiddleware {
            origin_validation,
            allowed_headers: self.allowed_headers,
            allowed_methods: self.allowed_methods,
            allow_credentials: self.allow_credentials,
            expose_headers: self.expose_headers,
            max_age: self.max_age,
        })
    }
}

impl Default for CorsMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_origin(origin: &str) -> bool {
    match origin.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
                && !rest.is_empty()
                && !rest.contains('/')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_with_credentials_is_rejected() {
        let err = CorsMiddlewareBuilder::new()
            .allowed_origins(&["*"])
            .allow_credentials(true)
            .build()
            .unwrap_err();
        assert_eq!(err, CorsConfigError::WildcardWithCredentials);
    }

    #[test]
    fn credentials_need_an_origin() {
        let err = CorsMiddlewareBuilder::new()
            .allow_credentials(true)
            .build()
            .unwrap_err();
        assert_eq!(err, CorsConfigError::EmptyOriginsWithCredentials);
    }

    #[test]
    fn malformed_origin_and_pattern_are_rejected() {
        assert!(matches!(
            CorsMiddlewareBuilder::new().allowed_origins(&["example.com"]).build(),
            Err(CorsConfigError::InvalidOriginFormat { .. })
        ));
        assert!(matches!(
            CorsMiddlewareBuilder::new().origin_patterns(&["(unclosed"]).build(),
            Err(CorsConfigError::InvalidOriginPattern { .. })
        ));
    }
}
