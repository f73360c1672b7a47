//! HTTP response building
//!
//! Headers are kept as an ordered list so several `Set-Cookie` lines can
//! coexist. The body is a tagged variant chosen once at assembly time: a
//! one-shot buffer for generated content, or a pull reader for long-lived
//! resources that the transport drains chunk by chunk.

use bytes::Bytes;

use super::constants::{content_types, headers};

/// HTTP status codes used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,
    PartialContent = 206,

    // 3xx Redirection
    NotModified = 304,

    // 4xx Client Error
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    PreconditionFailed = 412,
    PayloadTooLarge = 413,
    RangeNotSatisfiable = 416,
    ImATeapot = 418,
    /// Vendor value: too many connections from one client
    TooManyConnections = 421,

    // 5xx Server Error
    InternalServerError = 500,
    NotImplemented = 501,
}

impl StatusCode {
    /// Get the status code as a number
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the reason phrase for this status code
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PreconditionFailed => "Precondition Failed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::RangeNotSatisfiable => "Range Not Satisfiable",
            StatusCode::ImATeapot => "I'm a Teapot",
            StatusCode::TooManyConnections => "Too Many Connections",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }

    /// Responses that never carry a body
    pub fn is_bodiless(self) -> bool {
        matches!(self, StatusCode::NotModified)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Pull-based body source, read by byte offset relative to the served range
pub trait ContentReader: Send {
    /// Fill `buf` with bytes starting at `offset`; returns 0 at end of stream
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Number of bytes this reader will deliver in total
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response body variants
pub enum ResponseBody {
    Empty,
    /// One-shot generated content
    Buffer(Bytes),
    /// Long-lived resource streamed on demand
    Pull(Box<dyn ContentReader>),
}

impl ResponseBody {
    /// Declared body length
    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Buffer(bytes) => bytes.len() as u64,
            ResponseBody::Pull(reader) => reader.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the body into memory; pull readers are read to completion
    pub fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Buffer(bytes) => Ok(bytes),
            ResponseBody::Pull(mut reader) => {
                let mut out = Vec::with_capacity(reader.len() as usize);
                let mut chunk = vec![0u8; 64 * 1024];
                loop {
                    let n = reader.read_at(out.len() as u64, &mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&chunk[..n]);
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            ResponseBody::Pull(reader) => write!(f, "Pull({} bytes)", reader.len()),
        }
    }
}

/// HTTP response builder with fluent API
///
/// # Example
///
/// ```rust
/// use hestia_core::http::{HttpResponse, StatusCode};
///
/// let response = HttpResponse::ok()
///     .header("Cache-Control", "no-store")
///     .json(r#"{"total":0,"rows":[]}"#);
/// assert_eq!(response.status(), StatusCode::Ok);
/// ```
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: ResponseBody,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), body: ResponseBody::Empty }
    }

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    /// Create a 304 Not Modified response
    pub fn not_modified() -> Self {
        Self::new(StatusCode::NotModified)
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound)
    }

    // Builder methods

    /// Set a header, replacing any previous value of the same name
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Append a header without replacing existing ones (e.g. `Set-Cookie`)
    pub fn append_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(headers::CONTENT_TYPE, content_type)
    }

    /// Set the body
    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    /// Set the body as raw bytes
    pub fn bytes(self, data: impl Into<Bytes>) -> Self {
        self.body(ResponseBody::Buffer(data.into()))
    }

    /// Set the body as text (UTF-8)
    pub fn text(self, text: &str) -> Self {
        self.content_type(content_types::TEXT).bytes(text.to_string())
    }

    /// Set the body as HTML
    pub fn html(self, html: &str) -> Self {
        self.content_type(content_types::HTML).bytes(html.to_string())
    }

    /// Set the body as JSON
    pub fn json(self, json: &str) -> Self {
        self.content_type(content_types::JSON).bytes(json.to_string())
    }

    /// Replace or insert a header in place
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Drop the body while keeping headers (HEAD requests)
    pub fn strip_body(&mut self) {
        self.body = ResponseBody::Empty;
    }

    // Accessors

    /// Get the status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get all headers in insertion order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the first value of a header, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Get every value of a header, case-insensitively
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.iter().filter(move |(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Borrow the body
    pub fn body_ref(&self) -> &ResponseBody {
        &self.body
    }

    /// Split into parts for the transport
    pub fn into_parts(self) -> (StatusCode, Vec<(String, String)>, ResponseBody) {
        (self.status, self.headers, self.body)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(u64);

    impl ContentReader for Counting {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.0.saturating_sub(offset) as usize;
            let n = remaining.min(buf.len());
            for (i, b) in buf[..n].iter_mut().enumerate() {
                *b = ((offset as usize + i) % 251) as u8;
            }
            Ok(n)
        }

        fn len(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::RangeNotSatisfiable.to_string(), "416 Range Not Satisfiable");
        assert_eq!(StatusCode::TooManyConnections.as_u16(), 421);
        assert_eq!(StatusCode::ImATeapot.as_u16(), 418);
    }

    #[test]
    fn test_json_response() {
        let response = HttpResponse::ok().json(r#"{"message": "test"}"#);
        assert_eq!(response.header_value("content-type"), Some("application/json"));
        assert_eq!(response.body_ref().len(), 19);
    }

    #[test]
    fn test_multiple_set_cookie() {
        let response = HttpResponse::ok()
            .append_header("Set-Cookie", "a=1")
            .append_header("Set-Cookie", "b=2")
            .header("ETag", "\"x\"")
            .header("etag", "\"y\"");
        let cookies: Vec<_> = response.header_values("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(response.header_value("ETag"), Some("\"y\""));
    }

    #[test]
    fn test_pull_body_drains() {
        let body = ResponseBody::Pull(Box::new(Counting(200_000)));
        assert_eq!(body.len(), 200_000);
        let bytes = body.into_bytes().unwrap();
        assert_eq!(bytes.len(), 200_000);
        assert_eq!(bytes[70_000], (70_000 % 251) as u8);
    }
}
