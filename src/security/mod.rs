//! # Security Module
//!
//! Credential parsing and claim checks.
//!
//! Token verification is delegated to a [`CredentialCheck`] implementation.
//! Its outcome is attached to the request by
//! [`AuthTokenMiddleware`](crate::middleware::AuthTokenMiddleware) as request
//! attributes, out of reach of query, body, cookie and session input:
//!
//! | key                  | value                                        |
//! |----------------------|----------------------------------------------|
//! | `auth.parse.status`  | `ok`, `missing`, `malformed` or `rejected`   |
//! | `auth.parse.message` | failure reason, empty on success             |
//! | `auth.claims.<name>` | one entry per claim                          |
//!
//! Handler hooks ([`RequireClaims`]) and scoped middleware
//! ([`ClaimGuard`](crate::middleware::ClaimGuard)) read those attributes and
//! raise 401 or 403. A request that never passed through a credential check
//! has no attributes and is treated as `missing`.

mod bearer;

pub use bearer::BearerClaimsParser;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::dispatcher::{HandlerResult, Hook};
use crate::error::HttpError;
use crate::server::{Request, Response};

pub const AUTH_STATUS_KEY: &str = "auth.parse.status";
pub const AUTH_MESSAGE_KEY: &str = "auth.parse.message";
pub const CLAIM_PREFIX: &str = "auth.claims.";

/// Parsed token claims.
pub type Claims = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No credential on the request.
    Missing,
    /// A credential was present but could not be parsed.
    Malformed,
    /// Parsed, but refused by the check.
    Rejected,
}

impl CredentialStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialStatus::Missing => "missing",
            CredentialStatus::Malformed => "malformed",
            CredentialStatus::Rejected => "rejected",
        }
    }
}

/// Why a credential check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CredentialFailure {
    pub status: CredentialStatus,
    pub message: String,
}

impl CredentialFailure {
    pub fn new(status: CredentialStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Pluggable credential parser/verifier.
pub trait CredentialCheck: Send + Sync {
    fn check(&self, request: &Request) -> Result<Claims, CredentialFailure>;
}

impl<F> CredentialCheck for F
where
    F: Fn(&Request) -> Result<Claims, CredentialFailure> + Send + Sync,
{
    fn check(&self, request: &Request) -> Result<Claims, CredentialFailure> {
        self(request)
    }
}

/// Attributes describing a credential check outcome.
pub fn credential_attributes(outcome: &Result<Claims, CredentialFailure>) -> Vec<(String, Value)> {
    match outcome {
        Ok(claims) => {
            let mut vars = Vec::with_capacity(claims.len() + 2);
            vars.push((AUTH_STATUS_KEY.to_string(), Value::from("ok")));
            vars.push((AUTH_MESSAGE_KEY.to_string(), Value::from("")));
            vars.extend(
                claims
                    .iter()
                    .map(|(k, v)| (format!("{CLAIM_PREFIX}{k}"), v.clone())),
            );
            vars
        }
        Err(failure) => vec![
            (AUTH_STATUS_KEY.to_string(), Value::from(failure.status.as_str())),
            (AUTH_MESSAGE_KEY.to_string(), Value::from(failure.message.clone())),
        ],
    }
}

fn claim_satisfies(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.contains(expected),
        Value::String(s) if expected.is_string() => {
            // space separated scope lists
            s.split_whitespace().any(|part| Some(part) == expected.as_str())
        }
        other => other == expected,
    }
}

/// Check the credential attributes on `request` against `required`.
///
/// 401 when no valid credential was parsed, 403 when a claim is absent or
/// does not match.
pub fn require_claims(request: &Request, required: &[(String, Value)]) -> HandlerResult {
    let status = request.attribute_str(AUTH_STATUS_KEY);
    if status.as_deref() != Some("ok") {
        let message = request
            .attribute_str(AUTH_MESSAGE_KEY)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Authentication required".to_string());
        return Err(HttpError::unauthorized(message)
            .with_metadata("reason", status.unwrap_or_else(|| "missing".to_string())));
    }
    for (name, expected) in required {
        let satisfied = request
            .attribute(&format!("{CLAIM_PREFIX}{name}"))
            .is_some_and(|actual| claim_satisfies(actual, expected));
        if !satisfied {
            debug!(request_id = %request.id(), claim = %name, "Required claim not satisfied");
            return Err(HttpError::forbidden("Insufficient privileges").with_metadata("claim", name.as_str()));
        }
    }
    Ok(())
}

/// Handler hook requiring a set of claims.
#[derive(Debug, Clone, Default)]
pub struct RequireClaims {
    required: Vec<(String, Value)>,
}

impl RequireClaims {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.required.push((name.into(), value.into()));
        self
    }

    pub fn required(&self) -> &[(String, Value)] {
        &self.required
    }
}

impl Hook for RequireClaims {
    fn before(&self, request: &Request, _response: &mut Response) -> HandlerResult {
        require_claims(request, &self.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn request_with(outcome: Result<Claims, CredentialFailure>) -> Request {
        let mut req = Request::new(Method::GET, "/admin");
        for (name, value) in credential_attributes(&outcome) {
            req.set_attribute(name, value);
        }
        req
    }

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_credentials_are_401() {
        let req = request_with(Err(CredentialFailure::new(
            CredentialStatus::Missing,
            "No bearer token",
        )));
        let err = require_claims(&req, &[]).unwrap_err();
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), "No bearer token");
        assert_eq!(err.metadata()["reason"], "missing");
    }

    #[test]
    fn claim_mismatch_is_403() {
        let hook = RequireClaims::new().claim("role", "admin");
        let req = request_with(Ok(claims(json!({"role": "user"}))));
        let err = hook.before(&req, &mut Response::new()).unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.message(), "Insufficient privileges");
    }

    #[test]
    fn claims_match_exactly_in_lists_or_scopes() {
        let req = request_with(Ok(claims(json!({
            "role": "admin",
            "groups": ["ops", "dev"],
            "scope": "read:items write:items"
        }))));
        let hook = RequireClaims::new()
            .claim("role", "admin")
            .claim("groups", "ops")
            .claim("scope", "write:items");
        assert!(hook.before(&req, &mut Response::new()).is_ok());
    }

    #[test]
    fn client_parameters_never_satisfy_claims() {
        let hook = RequireClaims::new().claim("role", "admin");

        let forged = Request::new(
            Method::GET,
            "/admin?auth.parse.status=ok&auth.claims.role=admin",
        )
        .with_cookie("auth.claims.role", "admin");
        let err = hook.before(&forged, &mut Response::new()).unwrap_err();
        assert_eq!(err.status(), 401);

        let mut partial = Request::new(Method::GET, "/admin?auth.claims.role=admin");
        for (name, value) in credential_attributes(&Ok(claims(json!({ "sub": "ada" })))) {
            partial.set_attribute(name, value);
        }
        let err = hook.before(&partial, &mut Response::new()).unwrap_err();
        assert_eq!(err.status(), 403);
    }
}
