use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use http::Method;
use tracing::{debug, warn};

use super::{BeforeContext, Middleware, MiddlewareOutcome};
use crate::error::HttpError;
use crate::router::MatchResult;
use crate::server::SerializationMode;

/// Serves files under a base directory for `GET`/`HEAD` requests that no
/// route matched.
///
/// A served file is written verbatim in `Raw` mode and the handler phase is
/// vetoed with `StopProcessing`; a missing file leaves the 404 to the
/// dispatcher.
#[derive(Debug, Clone)]
pub struct StaticFileMiddleware {
    base_dir: PathBuf,
    index: Option<String>,
}

impl StaticFileMiddleware {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            index: Some("index.html".to_string()),
        }
    }

    /// File served for directory paths. `None` disables directory indexes.
    pub fn index(mut self, name: Option<&str>) -> Self {
        self.index = name.map(str::to_string);
        self
    }

    /// Map a URL path below the base directory. Rejects `..`, absolute and
    /// prefixed components.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css",
            "js" | "mjs" => "application/javascript",
            "json" => "application/json",
            "xml" => "application/xml",
            "csv" => "text/csv",
            "txt" => "text/plain; charset=utf-8",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
    }

    /// Bytes and content type for `url_path`, or `NotFound`.
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let mut path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if path.is_dir() {
            match &self.index {
                Some(index) => path.push(index),
                None => return Err(io::Error::new(io::ErrorKind::NotFound, "directory")),
            }
        }
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }
}

impl Middleware for StaticFileMiddleware {
    fn before(&self, ctx: &mut BeforeContext<'_>) -> Result<MiddlewareOutcome, HttpError> {
        if !matches!(ctx.route, MatchResult::NotFound) {
            return Ok(MiddlewareOutcome::Continue);
        }
        let method = ctx.request.method();
        if method != Method::GET && method != Method::HEAD {
            return Ok(MiddlewareOutcome::Continue);
        }
        match self.load(ctx.request.path()) {
            Ok((bytes, content_type)) => {
                debug!(
                    request_id = %ctx.request.id(),
                    path = %ctx.request.path(),
                    size = bytes.len(),
                    "Static file served"
                );
                ctx.response.set_mode(SerializationMode::Raw);
                ctx.response.set_header("Content-Type", content_type);
                ctx.response.write_bytes(bytes);
                Ok(MiddlewareOutcome::StopProcessing)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(MiddlewareOutcome::Continue),
            Err(err) => {
                warn!(
                    request_id = %ctx.request.id(),
                    path = %ctx.request.path(),
                    error = %err,
                    "Static file read failed"
                );
                Ok(MiddlewareOutcome::Continue)
            }
        }
    }

    fn name(&self) -> &'static str {
        "static_files"
    }
}
