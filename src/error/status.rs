use std::error::Error as StdError;
use std::fmt;

use http::{Method, StatusCode};
use serde_json::{Map, Value};

/// Message shown instead of the real one when an untyped failure is rendered
/// outside of detailed mode.
const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Codes a status line can carry.
pub const STATUS_CODE_RANGE: std::ops::RangeInclusive<u16> = 100..=999;

/// Status kinds understood by the dispatcher.
///
/// Each variant name is also the error's type name; the rendered `type` label
/// is derived from it with [`humanize_type_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpErrorKind {
    BadRequest,
    Unauthorized,
    PaymentRequired,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestTimeout,
    Conflict,
    PreconditionFailed,
    UnsupportedMediaType,
    UnprocessableEntity,
    TooManyRequests,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
    /// 520, returned when the matcher reports a state the dispatcher does not know.
    UnknownError,
    /// Arbitrary status with its own phrase and type name.
    Custom {
        code: u16,
        phrase: String,
        type_name: String,
    },
}

impl HttpErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            HttpErrorKind::BadRequest => 400,
            HttpErrorKind::Unauthorized => 401,
            HttpErrorKind::PaymentRequired => 402,
            HttpErrorKind::Forbidden => 403,
            HttpErrorKind::NotFound => 404,
            HttpErrorKind::MethodNotAllowed => 405,
            HttpErrorKind::NotAcceptable => 406,
            HttpErrorKind::RequestTimeout => 408,
            HttpErrorKind::Conflict => 409,
            HttpErrorKind::PreconditionFailed => 412,
            HttpErrorKind::UnsupportedMediaType => 415,
            HttpErrorKind::UnprocessableEntity => 422,
            HttpErrorKind::TooManyRequests => 429,
            HttpErrorKind::InternalServerError => 500,
            HttpErrorKind::NotImplemented => 501,
            HttpErrorKind::ServiceUnavailable => 503,
            HttpErrorKind::UnknownError => 520,
            HttpErrorKind::Custom { code, .. } => *code,
        }
    }

    /// Map a status code back to its kind; codes outside the taxonomy become
    /// [`HttpErrorKind::Custom`] with the canonical phrase when one exists.
    /// Codes outside 100..=999 cannot be written and map to 500.
    pub fn from_code(code: u16) -> Self {
        match code {
            invalid if !STATUS_CODE_RANGE.contains(&invalid) => HttpErrorKind::InternalServerError,
            400 => HttpErrorKind::BadRequest,
            401 => HttpErrorKind::Unauthorized,
            402 => HttpErrorKind::PaymentRequired,
            403 => HttpErrorKind::Forbidden,
            404 => HttpErrorKind::NotFound,
            405 => HttpErrorKind::MethodNotAllowed,
            406 => HttpErrorKind::NotAcceptable,
            408 => HttpErrorKind::RequestTimeout,
            409 => HttpErrorKind::Conflict,
            412 => HttpErrorKind::PreconditionFailed,
            415 => HttpErrorKind::UnsupportedMediaType,
            422 => HttpErrorKind::UnprocessableEntity,
            429 => HttpErrorKind::TooManyRequests,
            500 => HttpErrorKind::InternalServerError,
            501 => HttpErrorKind::NotImplemented,
            503 => HttpErrorKind::ServiceUnavailable,
            520 => HttpErrorKind::UnknownError,
            other => {
                let phrase = status_phrase(other).to_string();
                let type_name = phrase.replace(' ', "");
                HttpErrorKind::Custom {
                    code: other,
                    phrase,
                    type_name,
                }
            }
        }
    }

    /// Reason phrase for the status line.
    pub fn phrase(&self) -> &str {
        match self {
            HttpErrorKind::Custom { phrase, .. } => phrase,
            other => status_phrase(other.code()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            HttpErrorKind::BadRequest => "BadRequest",
            HttpErrorKind::Unauthorized => "Unauthorized",
            HttpErrorKind::PaymentRequired => "PaymentRequired",
            HttpErrorKind::Forbidden => "Forbidden",
            HttpErrorKind::NotFound => "NotFound",
            HttpErrorKind::MethodNotAllowed => "MethodNotAllowed",
            HttpErrorKind::NotAcceptable => "NotAcceptable",
            HttpErrorKind::RequestTimeout => "RequestTimeout",
            HttpErrorKind::Conflict => "Conflict",
            HttpErrorKind::PreconditionFailed => "PreconditionFailed",
            HttpErrorKind::UnsupportedMediaType => "UnsupportedMediaType",
            HttpErrorKind::UnprocessableEntity => "UnprocessableEntity",
            HttpErrorKind::TooManyRequests => "TooManyRequests",
            HttpErrorKind::InternalServerError => "InternalServerError",
            HttpErrorKind::NotImplemented => "NotImplemented",
            HttpErrorKind::ServiceUnavailable => "ServiceUnavailable",
            HttpErrorKind::UnknownError => "UnknownError",
            HttpErrorKind::Custom { type_name, .. } => type_name,
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.phrase())
    }
}

/// Canonical reason phrase for a status code.
///
/// Falls back to `"Unknown Error"` for codes `http` has no phrase for (520
/// included).
pub fn status_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Error")
}

/// Turn a type name into the label rendered in error envelopes.
///
/// A trailing `Exception` is dropped and a space is inserted before every
/// capital that follows a lowercase letter or digit, and before every digit
/// run that follows a letter: `InternalServerError` becomes
/// `Internal Server Error`, `Http2Failure` becomes `Http 2 Failure`.
pub fn humanize_type_name(name: &str) -> String {
    let base = name.strip_suffix("Exception").unwrap_or(name);
    let base = if base.is_empty() { name } else { base };

    let mut out = String::with_capacity(base.len() + 4);
    let mut prev: Option<char> = None;
    for c in base.chars() {
        if let Some(p) = prev {
            let boundary = (c.is_uppercase() && (p.is_lowercase() || p.is_ascii_digit()))
                || (c.is_ascii_digit() && p.is_alphabetic());
            if boundary {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Typed HTTP failure carried from handlers, hooks and middleware to the
/// renderer.
///
/// The status, message and metadata are rendered as the error envelope. An
/// optional cause keeps the original error for detailed mode.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
    metadata: Map<String, Value>,
    /// When false the message is replaced by a generic one unless detailed
    /// errors are enabled.
    public: bool,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            metadata: Map::new(),
            public: true,
            cause: None,
        }
    }

    /// Build an error for an arbitrary status code outside the taxonomy.
    ///
    /// A code outside 100..=999 yields a private 500 carrying the rejected
    /// code under `metadata.invalid_status`.
    pub fn custom(
        code: u16,
        phrase: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        if !STATUS_CODE_RANGE.contains(&code) {
            return Self::new(HttpErrorKind::InternalServerError, message)
                .private()
                .with_metadata("invalid_status", code);
        }
        Self::new(
            HttpErrorKind::Custom {
                code,
                phrase: phrase.into(),
                type_name: type_name.into(),
            },
            message,
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::NotFound, message)
    }

    /// 405 listing the methods the path does accept under `allowed`.
    pub fn method_not_allowed(method: &Method, allowed: &[Method]) -> Self {
        let allowed: Vec<Value> = allowed
            .iter()
            .map(|m| Value::String(m.as_str().to_string()))
            .collect();
        Self::new(
            HttpErrorKind::MethodNotAllowed,
            format!("Method {method} is not allowed for this resource"),
        )
        .with_metadata("allowed", Value::Array(allowed))
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::NotAcceptable, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Conflict, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::UnprocessableEntity, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::TooManyRequests, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::NotImplemented, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::ServiceUnavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::UnknownError, message)
    }

    /// 500 whose message is shown to clients as-is.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::InternalServerError, message)
    }

    /// 500 wrapping an untyped failure; its message only surfaces in
    /// detailed mode.
    pub fn wrap<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut wrapped = Self::new(HttpErrorKind::InternalServerError, err.to_string());
        wrapped.public = false;
        wrapped.cause = Some(Box::new(err));
        wrapped
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Hide the message from clients unless detailed errors are enabled.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn kind(&self) -> &HttpErrorKind {
        &self.kind
    }

    pub fn status(&self) -> u16 {
        self.kind.code()
    }

    pub fn phrase(&self) -> &str {
        self.kind.phrase()
    }

    /// Rendered `type` label, e.g. `"Not Found"`.
    pub fn type_label(&self) -> String {
        humanize_type_name(self.kind.type_name())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message as rendered to clients.
    pub fn public_message(&self, detailed: bool) -> &str {
        if self.public || detailed {
            &self.message
        } else {
            GENERIC_INTERNAL_MESSAGE
        }
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }

    /// Messages of the cause chain, outermost first.
    pub fn trace(&self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            frames.push(err.to_string());
            current = err.source();
        }
        frames
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        let mut wrapped = Self::new(HttpErrorKind::InternalServerError, format!("{err:#}"));
        wrapped.public = false;
        let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
        wrapped.cause = Some(boxed);
        wrapped
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        Self::wrap(err)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::wrap(err)
    }
}
