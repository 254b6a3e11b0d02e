use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use http::Method;
use once_cell::unsync::OnceCell;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::ids::{RequestId, REQUEST_ID_HEADER};

/// Deferred source of the raw request body.
pub type BodyFetcher = Box<dyn FnOnce() -> std::io::Result<Vec<u8>> + Send>;

/// The parameter namespaces a request is assembled from.
///
/// The declaration order is also the lookup precedence of
/// [`Request::param`]: later namespaces shadow earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Server,
    Cookie,
    Session,
    Body,
    Query,
    Route,
}

impl Namespace {
    /// Namespaces from lowest to highest precedence.
    pub const PRECEDENCE: [Namespace; 6] = [
        Namespace::Server,
        Namespace::Cookie,
        Namespace::Session,
        Namespace::Body,
        Namespace::Query,
        Namespace::Route,
    ];
}

type Params = HashMap<String, Value>;

/// Per-request view over method, path, headers and parameter namespaces.
///
/// Everything except the route namespace is fixed at construction. Route
/// variables are added through [`Request::append_variables`]. Middleware
/// attaches server-side data (credential outcomes) as attributes, which no
/// client namespace can reach. The body is fetched at most once, on first
/// access.
pub struct Request {
    id: RequestId,
    method: Method,
    path: String,
    query_string: String,
    /// Header names are stored lowercase; repeated headers are joined with `", "`.
    headers: HashMap<String, String>,
    server: Params,
    cookies: Params,
    session: Params,
    query: Params,
    route: Params,
    attributes: Params,
    body_fetcher: RefCell<Option<BodyFetcher>>,
    raw_body: OnceCell<Vec<u8>>,
    body_params: OnceCell<Params>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("headers", &self.headers)
            .field("route", &self.route)
            .field("attributes", &self.attributes)
            .field("body_loaded", &self.raw_body.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Create a request for `method` and `target`.
    ///
    /// `target` may carry a query string (`/pets?limit=10`); it is split off
    /// and parsed into the query namespace.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        let path = if path.is_empty() { "/" } else { path };

        let mut server = Params::new();
        server.insert("method".into(), Value::String(method.as_str().to_string()));
        server.insert("path".into(), Value::String(path.to_string()));
        server.insert("query_string".into(), Value::String(query_string.to_string()));

        Self {
            id: RequestId::new(),
            method,
            path: path.to_string(),
            query_string: query_string.to_string(),
            headers: HashMap::new(),
            server,
            cookies: Params::new(),
            session: Params::new(),
            query: parse_query_params(query_string),
            route: Params::new(),
            attributes: Params::new(),
            body_fetcher: RefCell::new(None),
            raw_body: OnceCell::new(),
            body_params: OnceCell::new(),
        }
    }

    /// Adapt an `http::Request`.
    ///
    /// Cookies and the request id are taken from headers and the protocol
    /// version is recorded in the server namespace. The body is parsed lazily.
    pub fn from_http(req: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut request = Request::new(parts.method, &target);
        for (name, value) in parts.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes());
            request = request.with_header(name.as_str(), &value);
        }
        request.server.insert(
            "protocol".into(),
            Value::String(format!("{:?}", parts.version)),
        );
        if let Some(host) = parts.uri.host() {
            request
                .server
                .insert("host".into(), Value::String(host.to_string()));
        }

        debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            header_count = request.headers.len(),
            cookie_count = request.cookies.len(),
            query_count = request.query.len(),
            body_bytes = body.len(),
            "HTTP request adapted"
        );

        request.with_body(body)
    }

    /// Add a header. `Cookie` headers also populate the cookie namespace and
    /// `X-Request-Id` replaces the generated id when it is a valid ULID.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            self.cookies.extend(
                parse_cookies(value)
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v))),
            );
        }
        if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            self.id = RequestId::from_header_or_new(Some(value));
        }
        self.headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies
            .insert(name.to_string(), Value::String(value.to_string()));
        self
    }

    #[must_use]
    pub fn with_session(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.session.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_server(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.server.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(self, body: Vec<u8>) -> Self {
        self.with_body_fetcher(Box::new(move || Ok(body)))
    }

    /// Install a deferred body source; it runs on first body access only.
    #[must_use]
    pub fn with_body_fetcher(mut self, fetcher: BodyFetcher) -> Self {
        *self.body_fetcher.get_mut() = Some(fetcher);
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Raw body bytes, fetched on first call and cached.
    ///
    /// A failed fetch is reported once; later calls see an empty body.
    pub fn raw_body(&self) -> Result<&[u8], HttpError> {
        self.raw_body
            .get_or_try_init(|| {
                let fetcher = self.body_fetcher.borrow_mut().take();
                match fetcher {
                    Some(fetch) => fetch().map_err(HttpError::from),
                    None => Ok(Vec::new()),
                }
            })
            .map(Vec::as_slice)
    }

    /// Body parsed as JSON, if it is valid JSON.
    pub fn json_body(&self) -> Option<Value> {
        let raw = self.raw_body().ok()?;
        if raw.is_empty() {
            return None;
        }
        serde_json::from_slice(raw).ok()
    }

    /// One parameter namespace.
    pub fn params(&self, namespace: Namespace) -> &HashMap<String, Value> {
        match namespace {
            Namespace::Server => &self.server,
            Namespace::Cookie => &self.cookies,
            Namespace::Session => &self.session,
            Namespace::Body => self.body_params(),
            Namespace::Query => &self.query,
            Namespace::Route => &self.route,
        }
    }

    /// Resolve `name` across all namespaces; route beats query beats body
    /// beats session beats cookie beats server.
    pub fn param(&self, name: &str) -> Option<&Value> {
        Namespace::PRECEDENCE
            .iter()
            .rev()
            .find_map(|ns| self.params(*ns).get(name))
    }

    /// String form of [`Request::param`]; non-string scalars are rendered.
    pub fn param_str(&self, name: &str) -> Option<String> {
        self.param(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// All namespaces merged with the same precedence as [`Request::param`].
    pub fn combined(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for ns in Namespace::PRECEDENCE {
            for (k, v) in self.params(ns) {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Add route-extracted or middleware-attached variables.
    pub fn append_variables<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in vars {
            self.route.insert(k.into(), v.into());
        }
    }

    /// Attach server-side data; never visible through [`Request::param`].
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// String form of [`Request::attribute`].
    pub fn attribute_str(&self, name: &str) -> Option<String> {
        self.attribute(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    fn body_params(&self) -> &Params {
        self.body_params.get_or_init(|| {
            let raw = match self.raw_body() {
                Ok(raw) if !raw.is_empty() => raw,
                Ok(_) => return Params::new(),
                Err(err) => {
                    warn!(request_id = %self.id, error = %err, "Request body fetch failed");
                    return Params::new();
                }
            };
            let content_type = self.content_type().unwrap_or("").to_ascii_lowercase();
            if content_type.starts_with("application/x-www-form-urlencoded") {
                return parse_query_params(&String::from_utf8_lossy(raw));
            }
            match serde_json::from_slice::<Value>(raw) {
                Ok(Value::Object(map)) => map.into_iter().collect(),
                Ok(_) => Params::new(),
                Err(err) => {
                    debug!(
                        request_id = %self.id,
                        content_type = %content_type,
                        error = %err,
                        "Body is not a JSON object; body namespace left empty"
                    );
                    Params::new()
                }
            }
        })
    }
}

/// Parse a `Cookie` header value into name/value pairs.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((name.to_string(), value))
        })
        .collect()
}

/// Parse an urlencoded query string; repeated keys keep the last value.
pub fn parse_query_params(query: &str) -> HashMap<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}
