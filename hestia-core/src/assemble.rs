//! Response assembly
//!
//! Turns a rendered resource plus the negotiation outcome into an
//! [`HttpResponse`]. File-backed content leaves as a pull body; generated
//! content leaves as one buffer, gzipped when the client and the resource
//! both allow it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::auth::Authenticator;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::http::constants::{cookies, headers};
use crate::http::date::format_http_date;
use crate::http::{
    parse_cookie_header, CookieBuilder, HttpRequest, HttpResponse, ResponseBody, SameSitePolicy,
    StatusCode,
};
use crate::negotiate;
use crate::range::{self, Inode, RangeError, ServedRange};
use crate::resource::{Resource, ResourceMeta, ResourceSource};
use crate::session::Session;

/// Ten years, for the session cookie
const SESSION_COOKIE_MAX_AGE: i64 = 10 * 365 * 24 * 60 * 60;

/// Session variable holding the user's language
pub const LANGUAGE_VAR: &str = "lang";

/// Byte range to serve, if the request asked for a usable one
///
/// Malformed `Range` values and a stale `If-Range` fall back to the whole
/// resource. Ranges outside the resource, and multiple ranges, are refused.
pub fn select_range(
    context: &RequestContext,
    meta: &ResourceMeta,
) -> EngineResult<Option<ServedRange>> {
    if !context.is_ranged() {
        return Ok(None);
    }
    let request = context.request();

    if let Some(if_range) = request.header_value(headers::IF_RANGE) {
        let last_modified = meta.modified.map(format_http_date);
        if !range::if_range_matches(if_range, meta.etag.as_deref(), last_modified.as_deref()) {
            return Ok(None);
        }
    }

    let Some(value) = request.header_value(headers::RANGE) else {
        return Ok(None);
    };
    let parsed = match range::parse_ranges(value) {
        Ok(parsed) => parsed,
        Err(_) => {
            log::debug!("Ignoring malformed Range {:?} on {}", value, request.path());
            return Ok(None);
        }
    };

    match range::resolve(&parsed, meta.size, &meta.mime) {
        Ok(served) => Ok(Some(served)),
        Err(RangeError::Malformed) => Ok(None),
        Err(err) => {
            log::debug!("Range {:?} on {}: {}", value, request.path(), err);
            Err(EngineError::RangeNotSatisfiable { size: meta.size })
        }
    }
}

fn is_compressible(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.contains("json")
        || mime.contains("javascript")
        || mime.contains("xml")
}

fn gzip(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// 200 or 206 response carrying the resource
pub fn assemble(
    context: &RequestContext,
    resource: Resource,
    served: Option<ServedRange>,
    cacheable: bool,
    now: DateTime<Utc>,
) -> EngineResult<HttpResponse> {
    let Resource { mut meta, source } = resource;

    let body = match (source, served) {
        (ResourceSource::Inode(mut inode), Some(window)) => {
            if let Some(value) = context.request().header_value(headers::RANGE) {
                inode.parse_ranges(value);
            }
            inode.select(window);
            ResponseBody::Pull(Box::new(inode))
        }
        (ResourceSource::Inode(inode), None) => ResponseBody::Pull(Box::new(inode)),
        (ResourceSource::Buffer(bytes), Some(window)) => {
            let mut inode = Inode::from_bytes(bytes);
            inode.select(window);
            ResponseBody::Pull(Box::new(inode))
        }
        (ResourceSource::Buffer(bytes), None) => {
            if meta.compress_allowed
                && meta.content_encoding.is_none()
                && context.zip_allowed()
                && is_compressible(&meta.mime)
            {
                meta.content_encoding = Some("gzip");
                ResponseBody::Buffer(gzip(&bytes)?)
            } else {
                ResponseBody::Buffer(bytes)
            }
        }
    };

    let status = if served.is_some() { StatusCode::PartialContent } else { StatusCode::Ok };
    let mut response = HttpResponse::new(status)
        .content_type(&meta.mime)
        .header(headers::ACCEPT_RANGES, "bytes");

    if let Some(window) = served {
        response.set_header(headers::CONTENT_RANGE, &window.content_range());
    }
    if let Some(encoding) = meta.content_encoding {
        response.set_header(headers::CONTENT_ENCODING, encoding);
    }
    for (name, value) in negotiate::cache_headers(&meta, cacheable, now) {
        response.set_header(name, &value);
    }
    response.set_header(headers::CONTENT_LENGTH, &body.len().to_string());

    Ok(response.body(body))
}

/// 304 carrying the validators the client should keep
pub fn not_modified(meta: &ResourceMeta, now: DateTime<Utc>) -> HttpResponse {
    let mut response = HttpResponse::not_modified();
    for (name, value) in negotiate::cache_headers(meta, true, now) {
        response.set_header(name, &value);
    }
    response
}

/// Translate an engine error into its response
pub fn error_response(err: &EngineError, authenticator: &Authenticator) -> HttpResponse {
    let status = err.status();
    let mut response = HttpResponse::new(status).header(headers::CACHE_CONTROL, "no-store");

    match err {
        EngineError::AuthChallenge { stale } => {
            response.set_header(headers::WWW_AUTHENTICATE, &authenticator.challenge(*stale));
        }
        EngineError::MethodNotAllowed { allow, .. } => {
            response.set_header(headers::ALLOW, allow);
        }
        EngineError::RangeNotSatisfiable { size } => {
            response.set_header(headers::CONTENT_RANGE, &range::unsatisfied_content_range(*size));
        }
        _ => {}
    }

    let message = if err.is_internal() {
        status.reason_phrase().to_string()
    } else {
        err.to_string()
    };
    response.set_header(headers::CONTENT_LENGTH, &message.len().to_string());
    response.text(&message)
}

/// How `Set-Cookie` lines are tagged
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub same_site: SameSitePolicy,
    /// Give the session cookie a fixed age instead of a browser-session lifetime
    pub persistent: bool,
    pub tls: bool,
}

/// `Set-Cookie` values for every cookie the client holds a stale copy of
pub fn session_cookies(request: &HttpRequest, session: &Session, policy: CookiePolicy) -> Vec<String> {
    let client = request.header_value(headers::COOKIE).map(parse_cookie_header).unwrap_or_default();
    let secure = policy.tls || request.is_secure();
    let differs = |name: &str, value: &str| client.get(name).map(String::as_str) != Some(value);
    let builder = |name: &str, value: &str| {
        CookieBuilder::new(name, value).secure(secure).same_site(policy.same_site)
    };

    let mut out = Vec::new();

    if differs(cookies::SESSION, session.id()) {
        let max_age = policy.persistent.then_some(SESSION_COOKIE_MAX_AGE);
        out.push(builder(cookies::SESSION, session.id()).http_only(true).max_age(max_age).build());
    }

    let level = session.level().to_string();
    if (session.is_authenticated() || client.contains_key(cookies::USER_LEVEL))
        && differs(cookies::USER_LEVEL, &level)
    {
        out.push(builder(cookies::USER_LEVEL, &level).build());
    }

    if let Some(language) = session.var_text(LANGUAGE_VAR) {
        if differs(cookies::LANGUAGE, &language) {
            out.push(builder(cookies::LANGUAGE, &language).build());
        }
    }

    let mut application: Vec<_> = session.cookies().into_iter().collect();
    application.sort();
    for (name, value) in application {
        if differs(&name, &value) {
            out.push(builder(&name, &value).build());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::resource::ResourceKind;
    use std::io::Read;

    fn meta(size: u64, mime: &str) -> ResourceMeta {
        ResourceMeta {
            mime: mime.to_string(),
            size,
            modified: None,
            etag: Some("\"v1\"".to_string()),
            kind: ResourceKind::VirtualLink,
            templated: false,
            caching_allowed: true,
            content_encoding: None,
            compress_allowed: true,
        }
    }

    fn context(request: HttpRequest) -> RequestContext {
        RequestContext::new(request, true)
    }

    #[test]
    fn test_select_range() {
        let ranged =
            |value: &str| context(HttpRequest::new(HttpMethod::GET, "/f").header("Range", value));
        let m = meta(100, "text/plain");

        assert_eq!(select_range(&ranged("bytes=10-19"), &m).unwrap().map(|r| r.len()), Some(10));
        assert!(select_range(&ranged("bytes=x-y"), &m).unwrap().is_none());
        assert!(matches!(
            select_range(&ranged("bytes=20-10"), &m),
            Err(EngineError::RangeNotSatisfiable { size: 100 })
        ));
        assert!(matches!(
            select_range(&ranged("bytes=0-1,4-5"), &m),
            Err(EngineError::RangeNotSatisfiable { size: 100 })
        ));
        assert!(select_range(&context(HttpRequest::new(HttpMethod::GET, "/f")), &m).unwrap().is_none());
    }

    #[test]
    fn test_stale_if_range_serves_whole() {
        let ctx = context(
            HttpRequest::new(HttpMethod::GET, "/f")
                .header("Range", "bytes=10-19")
                .header("If-Range", "\"v0\""),
        );
        assert!(select_range(&ctx, &meta(100, "text/plain")).unwrap().is_none());
    }

    #[test]
    fn test_partial_buffer() {
        let ctx = context(HttpRequest::new(HttpMethod::GET, "/f").header("Range", "bytes=2-5"));
        let data: Vec<u8> = (0..100u8).collect();
        let m = meta(100, "application/octet-stream");
        let served = select_range(&ctx, &m).unwrap();
        let resource = Resource { meta: m, source: ResourceSource::Buffer(Bytes::from(data)) };

        let response = assemble(&ctx, resource, served, true, Utc::now()).unwrap();
        assert_eq!(response.status(), StatusCode::PartialContent);
        assert_eq!(response.header_value("Content-Range"), Some("bytes 2-5/100"));
        assert_eq!(response.header_value("Content-Length"), Some("4"));
        let (_, _, body) = response.into_parts();
        assert_eq!(body.into_bytes().unwrap().as_ref(), &[2, 3, 4, 5]);
    }

    #[test]
    fn test_gzip_dynamic_buffer() {
        let ctx = context(HttpRequest::new(HttpMethod::GET, "/d").header("Accept-Encoding", "gzip"));
        let text = "hello hello hello hello hello hello".repeat(10);
        let resource = Resource {
            meta: meta(text.len() as u64, "application/json"),
            source: ResourceSource::Buffer(Bytes::from(text.clone())),
        };

        let response = assemble(&ctx, resource, None, false, Utc::now()).unwrap();
        assert_eq!(response.header_value("Content-Encoding"), Some("gzip"));
        let (_, _, body) = response.into_parts();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(body.into_bytes().unwrap().as_ref())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_error_responses() {
        let auth = Authenticator::new(
            "hestia",
            crate::auth::DigestAlgorithm::Md5,
            std::time::Duration::from_secs(60),
            0,
            crate::auth::CredentialTable::new(),
            Some(b"k"),
        );

        let challenge = error_response(&EngineError::AuthChallenge { stale: true }, &auth);
        assert_eq!(challenge.status(), StatusCode::Unauthorized);
        assert!(challenge.header_value("WWW-Authenticate").unwrap().contains("stale=true"));

        let range = error_response(&EngineError::RangeNotSatisfiable { size: 100 }, &auth);
        assert_eq!(range.header_value("Content-Range"), Some("bytes */100"));

        let method = error_response(
            &EngineError::MethodNotAllowed { method: "DELETE".into(), allow: "GET, HEAD".into() },
            &auth,
        );
        assert_eq!(method.header_value("Allow"), Some("GET, HEAD"));

        let internal = error_response(&EngineError::Internal("secret detail".into()), &auth);
        let (_, _, body) = internal.into_parts();
        assert_eq!(body.into_bytes().unwrap(), "Internal Server Error");
    }

    #[test]
    fn test_session_cookies() {
        let policy = CookiePolicy { same_site: SameSitePolicy::Strict, persistent: true, tls: false };
        let session = Session::new("5f0c1c6e-8d1b-4a43-9a4e-3c5f2b0f7a11".to_string(), None);

        let fresh = session_cookies(&HttpRequest::new(HttpMethod::GET, "/"), &session, policy);
        assert_eq!(fresh.len(), 1);
        assert!(fresh[0].starts_with("hestia_session=5f0c1c6e"));
        assert!(fresh[0].contains("HttpOnly"));
        assert!(fresh[0].contains("Max-Age=315360000"));
        assert!(fresh[0].contains("SameSite=Strict"));
        assert!(!fresh[0].contains("Secure"));

        session.set_cookie("theme", "dark");
        session.set_var(LANGUAGE_VAR, "fr").unwrap();
        let known = HttpRequest::new(HttpMethod::GET, "/")
            .header("Cookie", "hestia_session=5f0c1c6e-8d1b-4a43-9a4e-3c5f2b0f7a11; theme=dark")
            .secure(true);
        let updates = session_cookies(&known, &session, policy);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].starts_with("hestia_lang=fr"));
        assert!(updates[0].contains("Secure"));
    }

    #[test]
    fn test_browser_session_cookie_when_caching_disabled() {
        let policy = CookiePolicy { same_site: SameSitePolicy::Lax, persistent: false, tls: false };
        let session = Session::new("id".to_string(), None);
        let cookies = session_cookies(&HttpRequest::new(HttpMethod::GET, "/"), &session, policy);
        assert!(!cookies[0].contains("Max-Age"));
    }
}
