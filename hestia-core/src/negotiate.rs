//! Cache negotiation
//!
//! Conditional request evaluation and the caching headers stamped on every
//! successful response. Conditionals are only consulted for cacheable
//! resources; everything else is answered fresh with `no-store`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::context::RequestContext;
use crate::http::constants::headers;
use crate::http::date::{format_http_date, parse_http_date};
use crate::http::HttpMethod;
use crate::resource::ResourceMeta;

/// Headers listed in `Vary` and `Key` for dynamic resources
pub const VARY_FIELDS: &str = "Accept-Encoding, If-Modified-Since, If-None-Match, Last-Modified";

const CACHE_MAX_AGE: &str = "public, max-age=86400";

/// Result of evaluating the conditional headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    Proceed,
    NotModified,
    PreconditionFailed,
}

/// Whether an `If-None-Match` value names `etag`
///
/// Accepts `*` and comma-separated lists; comparison is weak, so `W/"x"`
/// matches `"x"`.
pub fn if_none_match_matches(header: &str, etag: Option<&str>) -> bool {
    header.split(',').map(str::trim).filter(|tag| !tag.is_empty()).any(|tag| {
        tag == "*" || etag.is_some_and(|etag| strip_weak(tag) == strip_weak(etag))
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Evaluate `If-None-Match`, then `If-Modified-Since`
///
/// A matching entity tag answers 304 to GET, HEAD and POST and 412 to any
/// other method. Without a match, `If-Modified-Since` is compared at second
/// precision and is ignored for methods that cannot answer 304.
pub fn evaluate(
    context: &RequestContext,
    etag: Option<&str>,
    modified: Option<DateTime<Utc>>,
) -> Conditional {
    let method = context.method();
    let request = context.request();

    if let Some(header) = request.header_value(headers::IF_NONE_MATCH) {
        if if_none_match_matches(header, etag) {
            return if method.answers_not_modified() {
                Conditional::NotModified
            } else {
                Conditional::PreconditionFailed
            };
        }
    }

    if context.has_if_modified_since() && method.answers_not_modified() {
        let since = request.header_value(headers::IF_MODIFIED_SINCE).map(parse_http_date);
        if let (Some(Ok(since)), Some(modified)) = (since, modified) {
            if modified.timestamp() <= since.timestamp() {
                return Conditional::NotModified;
            }
        }
    }

    Conditional::Proceed
}

/// Only 412 can be decided before the method check
pub fn precondition_fails(context: &RequestContext, etag: Option<&str>) -> bool {
    !context.method().answers_not_modified()
        && context
            .request()
            .header_value(headers::IF_NONE_MATCH)
            .is_some_and(|header| if_none_match_matches(header, etag))
}

/// Mime types the browser revalidates frequently
fn is_short_lived(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/html")
        || mime.starts_with("text/css")
        || mime.contains("javascript")
        || mime.contains("ecmascript")
}

/// 20-character throwaway entity tag: 6, 8 and 4 hex digits joined by `-`
pub fn random_etag() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "\"{:06x}-{:08x}-{:04x}\"",
        rng.gen::<u32>() & 0x00ff_ffff,
        rng.gen::<u32>(),
        rng.gen::<u16>()
    )
}

/// Caching headers for a response about to be served
pub fn cache_headers(
    meta: &ResourceMeta,
    cacheable: bool,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let mut out = Vec::with_capacity(6);

    if cacheable {
        if let Some(etag) = &meta.etag {
            out.push((headers::ETAG, etag.clone()));
        }
        if let Some(modified) = meta.modified {
            out.push((headers::LAST_MODIFIED, format_http_date(modified)));
        }
        let lifetime = if is_short_lived(&meta.mime) { Duration::days(1) } else { Duration::days(30) };
        out.push((headers::CACHE_CONTROL, CACHE_MAX_AGE.to_string()));
        out.push((headers::EXPIRES, format_http_date(now + lifetime)));
    } else {
        out.push((headers::ETAG, random_etag()));
        out.push((headers::CACHE_CONTROL, "no-store".to_string()));
        out.push((headers::EXPIRES, format_http_date(now - Duration::days(365))));
    }

    if meta.is_dynamic() {
        out.push((headers::VARY, VARY_FIELDS.to_string()));
        out.push((headers::KEY, VARY_FIELDS.to_string()));
    }

    out
}

/// Methods answered without touching any resource
pub fn is_forbidden_method(method: HttpMethod) -> bool {
    matches!(method, HttpMethod::TRACE | HttpMethod::CONNECT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::resource::ResourceKind;
    use chrono::TimeZone;

    fn meta(kind: ResourceKind, mime: &str) -> ResourceMeta {
        ResourceMeta {
            mime: mime.to_string(),
            size: 10,
            modified: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            etag: Some("\"abc\"".to_string()),
            kind,
            templated: false,
            caching_allowed: true,
            content_encoding: None,
            compress_allowed: false,
        }
    }

    fn context(method: HttpMethod, name: &str, value: &str) -> RequestContext {
        RequestContext::new(HttpRequest::new(method, "/x").header(name, value), true)
    }

    #[test]
    fn test_if_none_match_forms() {
        assert!(if_none_match_matches("\"abc\"", Some("\"abc\"")));
        assert!(if_none_match_matches("\"zzz\", \"abc\"", Some("\"abc\"")));
        assert!(if_none_match_matches("W/\"abc\"", Some("\"abc\"")));
        assert!(if_none_match_matches("*", None));
        assert!(!if_none_match_matches("\"zzz\"", Some("\"abc\"")));
        assert!(!if_none_match_matches("\"abc\"", None));
    }

    #[test]
    fn test_etag_match_by_method() {
        let get = context(HttpMethod::GET, "If-None-Match", "\"abc\"");
        assert_eq!(evaluate(&get, Some("\"abc\""), None), Conditional::NotModified);

        let delete = context(HttpMethod::DELETE, "If-None-Match", "\"abc\"");
        assert_eq!(evaluate(&delete, Some("\"abc\""), None), Conditional::PreconditionFailed);
        assert!(precondition_fails(&delete, Some("\"abc\"")));
        assert!(!precondition_fails(&get, Some("\"abc\"")));

        let stale = context(HttpMethod::GET, "If-None-Match", "\"old\"");
        assert_eq!(evaluate(&stale, Some("\"abc\""), None), Conditional::Proceed);
    }

    #[test]
    fn test_if_modified_since_second_precision() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + Duration::milliseconds(700);

        let same = context(HttpMethod::GET, "If-Modified-Since", "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(evaluate(&same, None, Some(modified)), Conditional::NotModified);

        let earlier = context(HttpMethod::GET, "If-Modified-Since", "Fri, 01 Mar 2024 11:59:59 GMT");
        assert_eq!(evaluate(&earlier, None, Some(modified)), Conditional::Proceed);

        let garbage = context(HttpMethod::GET, "If-Modified-Since", "sometime");
        assert_eq!(evaluate(&garbage, None, Some(modified)), Conditional::Proceed);

        let put = context(HttpMethod::PUT, "If-Modified-Since", "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(evaluate(&put, None, Some(modified)), Conditional::Proceed);
    }

    #[test]
    fn test_unmatched_etag_falls_back_to_modified_since() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let request = HttpRequest::new(HttpMethod::GET, "/x")
            .header("If-None-Match", "\"zzz\"")
            .header("If-Modified-Since", "Fri, 01 Mar 2024 12:00:00 GMT");
        let both = RequestContext::new(request, true);
        assert_eq!(evaluate(&both, Some("\"abc\""), Some(modified)), Conditional::NotModified);

        let request = HttpRequest::new(HttpMethod::GET, "/x")
            .header("If-None-Match", "\"zzz\"")
            .header("If-Modified-Since", "Fri, 01 Mar 2024 11:59:59 GMT");
        let newer = RequestContext::new(request, true);
        assert_eq!(evaluate(&newer, Some("\"abc\""), Some(modified)), Conditional::Proceed);
    }

    #[test]
    fn test_cacheable_headers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let headers = cache_headers(&meta(ResourceKind::Static, "text/html"), true, now);
        let get = |name: &str| headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone());

        assert_eq!(get("ETag").as_deref(), Some("\"abc\""));
        assert_eq!(get("Last-Modified").as_deref(), Some("Fri, 01 Mar 2024 12:00:00 GMT"));
        assert_eq!(get("Cache-Control").as_deref(), Some("public, max-age=86400"));
        assert_eq!(get("Expires").as_deref(), Some("Sun, 03 Mar 2024 00:00:00 GMT"));
        assert!(get("Vary").is_none());

        let image = cache_headers(&meta(ResourceKind::Static, "image/png"), true, now);
        let expires = image.iter().find(|(n, _)| *n == "Expires").map(|(_, v)| v.as_str());
        assert_eq!(expires, Some("Mon, 01 Apr 2024 00:00:00 GMT"));
    }

    #[test]
    fn test_uncacheable_headers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let headers = cache_headers(&meta(ResourceKind::VirtualLink, "application/json"), false, now);
        let get = |name: &str| headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone());

        let etag = get("ETag").unwrap();
        assert_eq!(etag.trim_matches('"').len(), 20);
        assert_eq!(etag.split('-').count(), 3);
        assert_eq!(get("Cache-Control").as_deref(), Some("no-store"));
        assert_eq!(get("Expires").as_deref(), Some("Fri, 03 Mar 2023 00:00:00 GMT"));
        assert!(get("Vary").unwrap().contains("Accept-Encoding"));
        assert_eq!(get("Key"), get("Vary"));
        assert!(get("Last-Modified").is_none());
    }
}
