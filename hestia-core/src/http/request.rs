//! Parsed HTTP request as delivered by the host transport
//!
//! Header names are stored lowercase so lookups are case-insensitive. Repeated
//! `Cookie` headers are folded into one value joined with `"; "`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use super::constants::headers;
use super::{HttpError, HttpResult};

/// HTTP methods understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    PATCH,
    TRACE,
    CONNECT,
    /// Vendor extension used by event-subscription clients
    SUBSCRIBE,
}

impl HttpMethod {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::CONNECT => "CONNECT",
            HttpMethod::SUBSCRIBE => "SUBSCRIBE",
        }
    }

    /// Methods for which a matching `If-None-Match` yields 304 rather than 412
    pub fn answers_not_modified(&self) -> bool {
        matches!(self, HttpMethod::GET | HttpMethod::HEAD | HttpMethod::POST)
    }

    /// Methods whose body is fed through the post/upload state machine
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "HEAD" => Ok(HttpMethod::HEAD),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "DELETE" => Ok(HttpMethod::DELETE),
            "OPTIONS" => Ok(HttpMethod::OPTIONS),
            "PATCH" => Ok(HttpMethod::PATCH),
            "TRACE" => Ok(HttpMethod::TRACE),
            "CONNECT" => Ok(HttpMethod::CONNECT),
            "SUBSCRIBE" => Ok(HttpMethod::SUBSCRIBE),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed query parameters from URL
pub type QueryParams = HashMap<String, String>;

/// HTTP headers collection, keyed by lowercase name
pub type Headers = HashMap<String, String>;

/// A request whose line and headers were already parsed by the host
///
/// # Example
///
/// ```rust
/// use hestia_core::http::{HttpMethod, HttpRequest};
///
/// let request = HttpRequest::new(HttpMethod::GET, "/data.json?page=2")
///     .header("Accept-Encoding", "gzip")
///     .remote("10.0.0.7:40112".parse().unwrap());
/// assert_eq!(request.query_param("page"), Some("2"));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: HttpMethod,
    path: String,
    query_params: QueryParams,
    headers: Headers,
    remote_addr: Option<SocketAddr>,
    secure: bool,
}

impl HttpRequest {
    /// Create a request from a method and a request target (path plus optional query)
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (path, query_params) = Self::parse_path_and_query(target);
        Self { method, path, query_params, headers: HashMap::new(), remote_addr: None, secure: false }
    }

    /// Add a header; repeated `Cookie` headers are folded together
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Set the peer address of the connection
    pub fn remote(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Mark the request as received over TLS
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// In-place variant of [`HttpRequest::header`] used by transport adapters
    pub fn insert_header(&mut self, name: &str, value: &str) {
        let name = name.trim().to_lowercase();
        let value = value.trim();
        match self.headers.get_mut(&name) {
            Some(existing) if name == headers::COOKIE => {
                existing.push_str("; ");
                existing.push_str(value);
            }
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                self.headers.insert(name, value.to_string());
            }
        }
    }

    /// Parse path and query parameters
    fn parse_path_and_query(full_path: &str) -> (String, QueryParams) {
        let (path, query) = match full_path.split_once('?') {
            Some((path, query)) => (path, query),
            None => (full_path, ""),
        };
        let path = path_decode(path);

        let mut params = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => {
                    params.insert(urlcode_decode(key), urlcode_decode(value));
                }
                None => {
                    params.insert(urlcode_decode(pair), String::new());
                }
            }
        }

        (path, params)
    }

    // Accessors

    /// Get the HTTP method
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Get the request path (without query parameters, percent-decoded)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the query parameters
    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    /// Get a specific query parameter
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(|s| s.as_str())
    }

    /// Get all headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a specific header value, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    /// Get the remote address (if available)
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Whether the connection is TLS-terminated
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Percent-decoding for URL paths; `+` stays literal
pub(crate) fn path_decode(s: &str) -> String {
    match urlencoding::decode(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

/// Percent-decoding for query and form components; `+` means space
pub(crate) fn urlcode_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::GET);
        assert_eq!("subscribe".parse::<HttpMethod>().unwrap(), HttpMethod::SUBSCRIBE);
        assert_eq!("TRACE".parse::<HttpMethod>().unwrap(), HttpMethod::TRACE);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_not_modified_methods() {
        assert!(HttpMethod::GET.answers_not_modified());
        assert!(HttpMethod::POST.answers_not_modified());
        assert!(!HttpMethod::DELETE.answers_not_modified());
        assert!(!HttpMethod::PUT.answers_not_modified());
    }

    #[test]
    fn test_parse_path_and_query() {
        let (path, params) = HttpRequest::parse_path_and_query("/users?page=1&size=10&flag");
        assert_eq!(path, "/users");
        assert_eq!(params.get("page"), Some(&"1".to_string()));
        assert_eq!(params.get("size"), Some(&"10".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_query_decoding() {
        let request = HttpRequest::new(HttpMethod::GET, "/my%20file.txt?q=a+b%26c");
        assert_eq!(request.path(), "/my file.txt");
        assert_eq!(request.query_param("q"), Some("a b&c"));
    }

    #[test]
    fn test_plus_in_path_is_literal() {
        let request = HttpRequest::new(HttpMethod::GET, "/c++/notes%2Bmore.txt?tag=c+plus");
        assert_eq!(request.path(), "/c++/notes+more.txt");
        assert_eq!(request.query_param("tag"), Some("c plus"));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let request = HttpRequest::new(HttpMethod::GET, "/")
            .header("Content-Type", "application/json")
            .header("Cookie", "a=1")
            .header("cookie", "b=2");
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(request.header_value("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(request.header_value("cookie"), Some("a=1; b=2"));
    }
}
