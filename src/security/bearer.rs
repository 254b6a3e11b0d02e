use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::debug;

use super::{Claims, CredentialCheck, CredentialFailure, CredentialStatus};
use crate::server::Request;

/// Reads claims from a `header.payload.signature` bearer token taken from
/// the `Authorization` header or a cookie.
///
/// The payload is base64url (or standard base64) JSON. No cryptographic
/// verification is performed; when `signature` is set the third segment must
/// equal it, which is enough for pre-shared test tokens.
#[derive(Debug, Clone, Default)]
pub struct BearerClaimsParser {
    pub(crate) signature: Option<String>,
    pub(crate) cookie_name: Option<String>,
}

impl BearerClaimsParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the token's signature segment to equal `signature`.
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Also look for the token in this cookie.
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    fn extract_token(&self, req: &Request) -> Option<String> {
        if let Some(name) = &self.cookie_name {
            if let Some(Value::String(t)) = req.params(crate::server::Namespace::Cookie).get(name) {
                return Some(t.clone());
            }
        }
        req.header("authorization")
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(|t| t.trim().to_string())
    }

    /// Parse a token into its claims.
    pub fn parse(&self, token: &str) -> Result<Claims, CredentialFailure> {
        let malformed = |msg: &str| CredentialFailure::new(CredentialStatus::Malformed, msg);

        let mut parts = token.split('.');
        let (Some(_header), Some(payload), sig) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed("Token is not header.payload.signature"));
        };
        if let Some(expected) = &self.signature {
            if sig != Some(expected.as_str()) {
                debug!("Bearer token signature mismatch");
                return Err(CredentialFailure::new(
                    CredentialStatus::Rejected,
                    "Token signature mismatch",
                ));
            }
        }

        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .or_else(|_| general_purpose::STANDARD.decode(payload))
            .map_err(|e| {
                debug!(error = %e, "Bearer token payload is not base64");
                malformed("Token payload is not base64")
            })?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(claims)) => Ok(claims),
            Ok(_) => Err(malformed("Token payload is not a JSON object")),
            Err(e) => {
                debug!(error = %e, "Bearer token payload is not JSON");
                Err(malformed("Token payload is not JSON"))
            }
        }
    }
}

impl CredentialCheck for BearerClaimsParser {
    fn check(&self, request: &Request) -> Result<Claims, CredentialFailure> {
        let token = self.extract_token(request).ok_or_else(|| {
            CredentialFailure::new(CredentialStatus::Missing, "No bearer token")
        })?;
        self.parse(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn token(claims: Value, sig: &str) -> String {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("eyJhbGciOiJub25lIn0.{payload}.{sig}")
    }

    #[test]
    fn parses_claims_from_authorization_header() {
        let req = Request::new(Method::GET, "/")
            .with_header("Authorization", &format!("Bearer {}", token(json!({"role": "admin"}), "sig")));
        let claims = BearerClaimsParser::new().check(&req).unwrap();
        assert_eq!(claims["role"], "admin");
    }

    #[test]
    fn failures_are_classified() {
        let parser = BearerClaimsParser::new().signature("good");
        let req = Request::new(Method::GET, "/");
        assert_eq!(parser.check(&req).unwrap_err().status, CredentialStatus::Missing);
        assert_eq!(parser.parse("abc").unwrap_err().status, CredentialStatus::Malformed);
        assert_eq!(
            parser.parse(&token(json!({}), "bad")).unwrap_err().status,
            CredentialStatus::Rejected
        );
        assert_eq!(
            parser.parse("a.!!!.good").unwrap_err().status,
            CredentialStatus::Malformed
        );
    }

    #[test]
    fn reads_token_from_cookie() {
        let req = Request::new(Method::GET, "/")
            .with_cookie("session", &token(json!({"sub": "u1"}), "x"));
        let claims = BearerClaimsParser::new()
            .cookie_name("session")
            .check(&req)
            .unwrap();
        assert_eq!(claims["sub"], "u1");
    }
}
