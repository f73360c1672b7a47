//! HTTP vocabulary shared by the engine and its host transport
//!
//! The engine never parses bytes off a socket. The host transport hands it an
//! already-parsed [`HttpRequest`] plus body chunks, and receives an
//! [`HttpResponse`] whose body is either a single buffer or a pull reader.
//!
//! - [`request`] - method taxonomy and the parsed request handed over by the host
//! - [`response`] - status taxonomy, response builder and body variants
//! - [`cookie`] - `Cookie` parsing and `Set-Cookie` rendering
//! - [`date`] - HTTP-date formatting and parsing

pub mod cookie;
pub mod date;
pub mod request;
pub mod response;

pub use cookie::{parse_cookie_header, CookieBuilder, SameSitePolicy};
pub use request::{Headers, HttpMethod, HttpRequest, QueryParams};
pub use response::{ContentReader, HttpResponse, ResponseBody, StatusCode};

/// Result type for HTTP vocabulary operations
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// HTTP-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Method outside the supported taxonomy
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    /// Malformed header value
    #[error("Invalid header {name}: {value}")]
    InvalidHeader { name: String, value: String },
    /// Unparsable HTTP-date
    #[error("Invalid HTTP date: {0}")]
    InvalidDate(String),
}

/// HTTP/1.1 protocol constants
pub mod constants {
    /// Header names, lowercase as stored in [`super::Headers`]
    pub mod headers {
        pub const ACCEPT_ENCODING: &str = "accept-encoding";
        pub const ACCEPT_RANGES: &str = "Accept-Ranges";
        pub const ALLOW: &str = "Allow";
        pub const AUTHORIZATION: &str = "authorization";
        pub const CACHE_CONTROL: &str = "Cache-Control";
        pub const CONNECTION: &str = "connection";
        pub const CONTENT_ENCODING: &str = "Content-Encoding";
        pub const CONTENT_LENGTH: &str = "Content-Length";
        pub const CONTENT_RANGE: &str = "Content-Range";
        pub const CONTENT_TYPE: &str = "Content-Type";
        pub const COOKIE: &str = "cookie";
        pub const ETAG: &str = "ETag";
        pub const EXPIRES: &str = "Expires";
        pub const IF_MODIFIED_SINCE: &str = "if-modified-since";
        pub const IF_NONE_MATCH: &str = "if-none-match";
        pub const IF_RANGE: &str = "if-range";
        pub const KEY: &str = "Key";
        pub const LAST_MODIFIED: &str = "Last-Modified";
        pub const RANGE: &str = "range";
        pub const SET_COOKIE: &str = "Set-Cookie";
        pub const UPGRADE: &str = "upgrade";
        pub const USER_AGENT: &str = "user-agent";
        pub const VARY: &str = "Vary";
        pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
        pub const X_REQUESTED_WITH: &str = "x-requested-with";
    }

    /// Common content types
    pub mod content_types {
        pub const JSON: &str = "application/json";
        pub const HTML: &str = "text/html; charset=utf-8";
        pub const TEXT: &str = "text/plain; charset=utf-8";
        pub const BINARY: &str = "application/octet-stream";
        pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
        pub const MULTIPART_FORM: &str = "multipart/form-data";
    }

    /// Fixed cookie names
    pub mod cookies {
        pub const SESSION: &str = "hestia_session";
        pub const USER_LEVEL: &str = "hestia_level";
        pub const LANGUAGE: &str = "hestia_lang";
    }
}
