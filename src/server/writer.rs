use std::io;

/// Sink for a rendered response.
///
/// The dispatcher always calls the status line first, then headers, then the
/// body, then `flush`. A header written with `replace = true` overwrites any
/// earlier header of the same name; `replace = false` adds another line.
pub trait Writer {
    fn write_status_line(&mut self, code: u16, phrase: &str) -> io::Result<()>;
    fn write_header(&mut self, name: &str, value: &str, replace: bool) -> io::Result<()>;
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
struct Staged {
    status: Option<(u16, String)>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Staged {
    fn header(&mut self, name: &str, value: &str, replace: bool) {
        if replace {
            self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// In-memory writer used by tests, the CLI probe and embedding hosts.
#[derive(Debug, Clone, Default)]
pub struct BufferedWriter {
    staged: Staged,
    flushed: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code written so far, 0 if none.
    pub fn status(&self) -> u16 {
        self.staged.status.as_ref().map(|(c, _)| *c).unwrap_or(0)
    }

    pub fn phrase(&self) -> &str {
        self.staged
            .status
            .as_ref()
            .map(|(_, p)| p.as_str())
            .unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.staged
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.staged.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.staged.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.staged.body).into_owned()
    }

    /// Body parsed as JSON; `Value::Null` when it is not JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.staged.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Convert into an `http::Response`.
    pub fn into_http_response(self) -> Result<http::Response<Vec<u8>>, http::Error> {
        let mut builder = http::Response::builder().status(self.status());
        for (name, value) in &self.staged.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(self.staged.body)
    }
}

impl Writer for BufferedWriter {
    fn write_status_line(&mut self, code: u16, phrase: &str) -> io::Result<()> {
        self.staged.status = Some((code, phrase.to_string()));
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str, replace: bool) -> io::Result<()> {
        self.staged.header(name, value, replace);
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.staged.body.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Serialises an HTTP/1.1 response onto any `io::Write` when flushed.
///
/// `Content-Length` is added when the headers do not already carry one.
pub struct Http1Writer<W: io::Write> {
    inner: W,
    staged: Staged,
}

impl<W: io::Write> Http1Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            staged: Staged::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> Writer for Http1Writer<W> {
    fn write_status_line(&mut self, code: u16, phrase: &str) -> io::Result<()> {
        self.staged.status = Some((code, phrase.to_string()));
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str, replace: bool) -> io::Result<()> {
        if name.contains(['\r', '\n']) || value.contains(['\r', '\n']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("header '{name}' contains a line break"),
            ));
        }
        self.staged.header(name, value, replace);
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.staged.body.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let (code, phrase) = staged
            .status
            .unwrap_or_else(|| (200, crate::error::status_phrase(200).to_string()));

        write!(self.inner, "HTTP/1.1 {code} {phrase}\r\n")?;
        let mut has_length = false;
        for (name, value) in &staged.headers {
            has_length |= name.eq_ignore_ascii_case("content-length");
            write!(self.inner, "{name}: {value}\r\n")?;
        }
        if !has_length && !matches!(code, 204 | 304) {
            write!(self.inner, "Content-Length: {}\r\n", staged.body.len())?;
        }
        self.inner.write_all(b"\r\n")?;
        self.inner.write_all(&staged.body)?;
        self.inner.flush()
    }
}
