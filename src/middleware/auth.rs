use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{BeforeContext, Middleware, MiddlewareOutcome};
use crate::error::HttpError;
use crate::security::{credential_attributes, require_claims, CredentialCheck};

/// Runs the credential collaborator and attaches its outcome to the request.
///
/// Never rejects on its own; [`ClaimGuard`] and
/// [`RequireClaims`](crate::security::RequireClaims) enforce.
pub struct AuthTokenMiddleware {
    check: Arc<dyn CredentialCheck>,
}

impl AuthTokenMiddleware {
    pub fn new(check: impl CredentialCheck + 'static) -> Self {
        Self {
            check: Arc::new(check),
        }
    }

    pub fn from_arc(check: Arc<dyn CredentialCheck>) -> Self {
        Self { check }
    }
}

impl Middleware for AuthTokenMiddleware {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        let outcome = self.check.check(ctx.request);
        if let Err(failure) = &outcome {
            debug!(
                request_id = %ctx.request.id(),
                status = failure.status.as_str(),
                reason = %failure.message,
                "Credential check failed"
            );
        }
        for (name, value) in credential_attributes(&outcome) {
            ctx.request.set_attribute(name, value);
        }
        Ok(MiddlewareOutcome::Continue)
    }

    fn name(&self) -> &'static str {
        "auth_token"
    }
}

/// Requires claims on every request it applies to; register it scoped.
#[derive(Debug, Clone, Default)]
pub struct ClaimGuard {
    required: Vec<(String, Value)>,
}

impl ClaimGuard {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.required.push((name.into(), value.into()));
        self
    }
}

impl Middleware for ClaimGuard {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        require_claims(ctx.request, &self.required)?;
        Ok(MiddlewareOutcome::Continue)
    }

    fn name(&self) -> &'static str {
        "claim_guard"
    }
}
