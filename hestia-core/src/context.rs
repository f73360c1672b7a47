//! Per-request facade with lazily computed header classifications
//!
//! Every classification is computed on first use and cached in a `OnceCell`,
//! so callers may ask in any order and always observe the same answer. The
//! header lookups behind them happen at most once per request.

use std::cell::{Cell, OnceCell};

use crate::http::constants::{content_types, headers};
use crate::http::{HttpMethod, HttpRequest};

pub struct RequestContext {
    request: HttpRequest,
    zip_enabled: bool,
    lookups: Cell<usize>,
    ranged: OnceCell<bool>,
    multipart: OnceCell<bool>,
    urlencoded: OnceCell<bool>,
    xhr: OnceCell<bool>,
    upgrade: OnceCell<bool>,
    zip_allowed: OnceCell<bool>,
    zip_content: OnceCell<bool>,
    if_modified_since: OnceCell<bool>,
    content_type: OnceCell<Option<String>>,
    content_length: OnceCell<Option<u64>>,
}

const CONTENT_ENCODING: &str = "content-encoding";
const CONTENT_LENGTH: &str = "content-length";
const CONTENT_TYPE: &str = "content-type";

impl RequestContext {
    pub fn new(request: HttpRequest, zip_enabled: bool) -> Self {
        Self {
            request,
            zip_enabled,
            lookups: Cell::new(0),
            ranged: OnceCell::new(),
            multipart: OnceCell::new(),
            urlencoded: OnceCell::new(),
            xhr: OnceCell::new(),
            upgrade: OnceCell::new(),
            zip_allowed: OnceCell::new(),
            zip_content: OnceCell::new(),
            if_modified_since: OnceCell::new(),
            content_type: OnceCell::new(),
            content_length: OnceCell::new(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn method(&self) -> HttpMethod {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Header lookups performed by the classifiers so far
    pub fn header_lookups(&self) -> usize {
        self.lookups.get()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.lookups.set(self.lookups.get() + 1);
        self.request.header_value(name)
    }

    /// Request body media type, without parameters, lowercase
    fn mime(&self) -> String {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.get_or_init(|| self.header(CONTENT_TYPE).map(str::to_string)).as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        *self
            .content_length
            .get_or_init(|| self.header(CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()))
    }

    pub fn is_ranged(&self) -> bool {
        *self.ranged.get_or_init(|| {
            self.header(headers::RANGE).is_some_and(|v| v.trim_start().starts_with("bytes="))
        })
    }

    pub fn is_multipart(&self) -> bool {
        *self.multipart.get_or_init(|| self.mime() == content_types::MULTIPART_FORM)
    }

    pub fn is_urlencoded(&self) -> bool {
        *self.urlencoded.get_or_init(|| self.mime() == content_types::FORM_URLENCODED)
    }

    /// `X-Requested-With: XMLHttpRequest`
    pub fn is_xhr(&self) -> bool {
        *self.xhr.get_or_init(|| {
            self.header(headers::X_REQUESTED_WITH)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("XMLHttpRequest"))
        })
    }

    /// `Connection` mentions `upgrade` and `Upgrade` is `websocket`
    pub fn is_upgrade(&self) -> bool {
        *self.upgrade.get_or_init(|| {
            let connection = self
                .header(headers::CONNECTION)
                .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
            connection
                && self
                    .header(headers::UPGRADE)
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
        })
    }

    /// Client accepts gzip and compression is enabled
    pub fn zip_allowed(&self) -> bool {
        *self.zip_allowed.get_or_init(|| {
            self.zip_enabled
                && self
                    .header(headers::ACCEPT_ENCODING)
                    .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"))
        })
    }

    /// The request body itself is gzip-encoded
    pub fn zip_content(&self) -> bool {
        *self.zip_content.get_or_init(|| {
            self.header(CONTENT_ENCODING).is_some_and(|v| v.to_ascii_lowercase().contains("gzip"))
        })
    }

    pub fn has_if_modified_since(&self) -> bool {
        *self.if_modified_since.get_or_init(|| self.header(headers::IF_MODIFIED_SINCE).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(request: HttpRequest) -> RequestContext {
        RequestContext::new(request, true)
    }

    #[test]
    fn test_classification_is_memoized() {
        let ctx = context(
            HttpRequest::new(HttpMethod::GET, "/movie.mp4")
                .header("Range", "bytes=0-")
                .header("Accept-Encoding", "gzip, deflate"),
        );

        assert!(ctx.is_ranged());
        assert_eq!(ctx.header_lookups(), 1);
        assert!(ctx.is_ranged());
        assert_eq!(ctx.header_lookups(), 1);

        assert!(ctx.zip_allowed());
        assert!(ctx.zip_allowed());
        assert!(!ctx.has_if_modified_since());
        assert!(!ctx.has_if_modified_since());
        assert_eq!(ctx.header_lookups(), 3);
    }

    #[test]
    fn test_body_type_classification() {
        let ctx = context(
            HttpRequest::new(HttpMethod::POST, "/upload")
                .header("Content-Type", "multipart/form-data; boundary=abc")
                .header("Content-Length", "42"),
        );
        assert!(ctx.is_multipart());
        assert!(!ctx.is_urlencoded());
        assert_eq!(ctx.content_length(), Some(42));
        // content type fetched once, shared by both classifiers
        assert_eq!(ctx.header_lookups(), 2);
    }

    #[test]
    fn test_upgrade_requires_both_headers() {
        let upgrade = context(
            HttpRequest::new(HttpMethod::GET, "/ws")
                .header("Connection", "keep-alive, Upgrade")
                .header("Upgrade", "websocket"),
        );
        assert!(upgrade.is_upgrade());

        let connection_only =
            context(HttpRequest::new(HttpMethod::GET, "/ws").header("Connection", "Upgrade"));
        assert!(!connection_only.is_upgrade());

        let h2c = context(
            HttpRequest::new(HttpMethod::GET, "/")
                .header("Connection", "Upgrade")
                .header("Upgrade", "h2c"),
        );
        assert!(!h2c.is_upgrade());
    }

    #[test]
    fn test_xhr_and_zip() {
        let ctx = RequestContext::new(
            HttpRequest::new(HttpMethod::GET, "/")
                .header("X-Requested-With", "XMLHttpRequest")
                .header("Accept-Encoding", "gzip")
                .header("Content-Encoding", "gzip"),
            false,
        );
        assert!(ctx.is_xhr());
        assert!(!ctx.zip_allowed());
        assert!(ctx.zip_content());
    }
}
