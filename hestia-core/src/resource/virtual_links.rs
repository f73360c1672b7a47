//! Application-registered URLs that produce their bytes in code

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::context::RequestContext;
use crate::http::HttpMethod;
use crate::session::Session;
use crate::sync::{lock, read, write};

/// What a link handler sees of the request
pub struct LinkRequest<'a> {
    pub context: &'a RequestContext,
    pub session: &'a Session,
    /// Query parameters merged with decoded form fields
    pub params: &'a HashMap<String, String>,
    /// Verbatim body of a non-form request
    pub body: Option<&'a Bytes>,
}

impl LinkRequest<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

pub type LinkHandler = Arc<dyn Fn(&LinkRequest<'_>) -> anyhow::Result<Bytes> + Send + Sync>;

/// Output of one render, with its validators
#[derive(Debug, Clone)]
pub struct Rendered {
    pub content: Bytes,
    pub hash: String,
    pub rendered_at: DateTime<Utc>,
}

impl Rendered {
    fn new(content: Bytes) -> Self {
        let hash = hex::encode(Sha256::digest(&content));
        Self { content, hash, rendered_at: Utc::now() }
    }
}

/// A URL served by application code
///
/// ```rust
/// use hestia_core::resource::VirtualLink;
///
/// let link = VirtualLink::new("/data.json", "application/json", |_req| {
///     Ok(r#"{"total":0,"rows":[]}"#.into())
/// })
/// .caching(true)
/// .min_level(1);
/// assert_eq!(link.url(), "/data.json");
/// ```
pub struct VirtualLink {
    url: String,
    mime: String,
    caching: bool,
    compress: bool,
    deferred: bool,
    methods: Vec<HttpMethod>,
    min_level: u32,
    handler: LinkHandler,
    usage: AtomicU64,
    last_access: Mutex<Option<DateTime<Utc>>>,
    content_hash: Mutex<Option<String>>,
    prerendered: OnceLock<Rendered>,
}

impl VirtualLink {
    pub fn new<F>(url: impl Into<String>, mime: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&LinkRequest<'_>) -> anyhow::Result<Bytes> + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            mime: mime.into(),
            caching: false,
            compress: true,
            deferred: true,
            methods: vec![HttpMethod::GET, HttpMethod::HEAD, HttpMethod::POST],
            min_level: 0,
            handler: Arc::new(handler),
            usage: AtomicU64::new(0),
            last_access: Mutex::new(None),
            content_hash: Mutex::new(None),
            prerendered: OnceLock::new(),
        }
    }

    /// Allow cache validators (ETag from the content hash, Last-Modified)
    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Allow gzip of the output when the client accepts it
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// `false` renders once on first use and serves that output from then on
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    pub fn methods(mut self, methods: &[HttpMethod]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    /// Privilege level required; 0 is public
    pub fn min_level(mut self, level: u32) -> Self {
        self.min_level = level;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn caching_allowed(&self) -> bool {
        self.caching
    }

    pub fn compress_allowed(&self) -> bool {
        self.compress
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn allowed_methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    pub fn required_level(&self) -> u32 {
        self.min_level
    }

    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_access)
    }

    /// Hash of the most recent output
    pub fn content_hash(&self) -> Option<String> {
        lock(&self.content_hash).clone()
    }

    /// Validators known without running the handler
    pub fn cached_render(&self) -> Option<&Rendered> {
        if self.deferred {
            None
        } else {
            self.prerendered.get()
        }
    }

    fn record_access(&self) {
        self.usage.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_access) = Some(Utc::now());
    }

    /// Produce the link's output for this request
    pub fn render(&self, request: &LinkRequest<'_>) -> anyhow::Result<Rendered> {
        self.record_access();

        if !self.deferred {
            if let Some(rendered) = self.prerendered.get() {
                return Ok(rendered.clone());
            }
        }

        let rendered = Rendered::new((self.handler)(request)?);
        *lock(&self.content_hash) = Some(rendered.hash.clone());
        if self.deferred {
            Ok(rendered)
        } else {
            // A concurrent first render may have won; serve whichever was stored
            Ok(self.prerendered.get_or_init(|| rendered).clone())
        }
    }
}

impl std::fmt::Debug for VirtualLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualLink")
            .field("url", &self.url)
            .field("mime", &self.mime)
            .field("deferred", &self.deferred)
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

/// Registry of virtual links keyed by URL
#[derive(Debug, Default)]
pub struct LinkRegistry {
    links: RwLock<HashMap<String, Arc<VirtualLink>>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link, replacing any previous one at the same URL
    pub fn register(&self, link: VirtualLink) -> Arc<VirtualLink> {
        let link = Arc::new(link);
        log::debug!("Registered virtual link {}", link.url());
        write(&self.links).insert(link.url().to_string(), Arc::clone(&link));
        link
    }

    pub fn unregister(&self, url: &str) -> Option<Arc<VirtualLink>> {
        write(&self.links).remove(url)
    }

    pub fn get(&self, url: &str) -> Option<Arc<VirtualLink>> {
        read(&self.links).get(url).cloned()
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = read(&self.links).keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        read(&self.links).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use std::sync::atomic::AtomicUsize;

    fn render(link: &VirtualLink) -> Rendered {
        let context = RequestContext::new(HttpRequest::new(HttpMethod::GET, link.url()), false);
        let session = Session::new("links".to_string(), None);
        let params = HashMap::new();
        let request = LinkRequest { context: &context, session: &session, params: &params, body: None };
        link.render(&request).unwrap()
    }

    #[test]
    fn test_deferred_link_renders_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let link = VirtualLink::new("/tick", "text/plain", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(n.to_string()))
        });

        assert_eq!(render(&link).content, "0");
        assert_eq!(render(&link).content, "1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(link.usage(), 2);
        assert!(link.last_access().is_some());
        assert!(link.cached_render().is_none());
    }

    #[test]
    fn test_prerendered_link_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let link = VirtualLink::new("/static.json", "application/json", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"{}"))
        })
        .deferred(false);

        let first = render(&link);
        let second = render(&link);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.hash, second.hash);
        assert_eq!(link.content_hash().as_deref(), Some(first.hash.as_str()));
        assert_eq!(link.cached_render().map(|r| r.hash.clone()), Some(first.hash));
        assert_eq!(link.usage(), 2);
    }

    #[test]
    fn test_handler_sees_params() {
        let link = VirtualLink::new("/echo", "text/plain", |req| {
            Ok(Bytes::from(req.param("q").unwrap_or("none").to_string()))
        });
        let context = RequestContext::new(HttpRequest::new(HttpMethod::GET, "/echo"), false);
        let session = Session::new("p".to_string(), None);
        let params = HashMap::from([("q".to_string(), "rust".to_string())]);
        let request = LinkRequest { context: &context, session: &session, params: &params, body: None };
        assert_eq!(link.render(&request).unwrap().content, "rust");
    }

    #[test]
    fn test_registry() {
        let registry = LinkRegistry::new();
        registry.register(VirtualLink::new("/b", "text/plain", |_| Ok(Bytes::new())));
        registry.register(VirtualLink::new("/a", "text/plain", |_| Ok(Bytes::new())));
        assert_eq!(registry.urls(), vec!["/a", "/b"]);
        assert!(registry.get("/a").is_some());
        assert!(registry.unregister("/a").is_some());
        assert_eq!(registry.len(), 1);
    }
}
