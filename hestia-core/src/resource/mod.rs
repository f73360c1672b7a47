//! Resource providers
//!
//! A request path resolves against three providers, first match wins:
//! application virtual links, files under the document root, then CGI
//! scripts. Resolution yields a [`Target`] that knows its accepted methods
//! and required level without producing any content; rendering it yields a
//! [`Resource`] ready for negotiation.

pub mod cgi;
pub mod static_files;
pub mod template;
pub mod virtual_links;

pub use cgi::{CgiExecutor, CgiOutput, CgiRequest, CgiScripts};
pub use static_files::{StaticFile, StaticRoot};
pub use virtual_links::{LinkHandler, LinkRegistry, LinkRequest, Rendered, VirtualLink};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::http::HttpMethod;
use crate::range::Inode;
use crate::sync::{read, write};

const STATIC_METHODS: &[HttpMethod] = &[HttpMethod::GET, HttpMethod::HEAD, HttpMethod::POST];
const CGI_METHODS: &[HttpMethod] =
    &[HttpMethod::GET, HttpMethod::HEAD, HttpMethod::POST, HttpMethod::PUT, HttpMethod::DELETE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Static,
    VirtualLink,
    Cgi,
}

/// Everything negotiation needs to know about a rendered resource
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    pub mime: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub kind: ResourceKind,
    pub templated: bool,
    pub caching_allowed: bool,
    /// Set when the source bytes are already encoded
    pub content_encoding: Option<&'static str>,
    /// On-the-fly gzip permitted
    pub compress_allowed: bool,
}

impl ResourceMeta {
    /// Output depends on the request or the session
    pub fn is_dynamic(&self) -> bool {
        self.templated || self.kind != ResourceKind::Static
    }

    pub fn is_cacheable(&self, caching_enabled: bool) -> bool {
        self.caching_allowed && caching_enabled && !self.templated && self.kind != ResourceKind::Cgi
    }
}

pub enum ResourceSource {
    Inode(Inode),
    Buffer(Bytes),
}

impl std::fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceSource::Inode(inode) => write!(f, "Inode({} bytes)", inode.size()),
            ResourceSource::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug)]
pub struct Resource {
    pub meta: ResourceMeta,
    pub source: ResourceSource,
}

/// Validators available before rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// What a request path resolved to
#[derive(Debug, Clone)]
pub enum Target {
    Link(Arc<VirtualLink>),
    Static(StaticFile),
    Cgi { script: PathBuf, executor: Arc<dyn CgiExecutor> },
}

impl Target {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Target::Link(_) => ResourceKind::VirtualLink,
            Target::Static(_) => ResourceKind::Static,
            Target::Cgi { .. } => ResourceKind::Cgi,
        }
    }

    pub fn allowed_methods(&self) -> &[HttpMethod] {
        match self {
            Target::Link(link) => link.allowed_methods(),
            Target::Static(_) => STATIC_METHODS,
            Target::Cgi { .. } => CGI_METHODS,
        }
    }

    /// HEAD rides along with GET
    pub fn allows(&self, method: HttpMethod) -> bool {
        let methods = self.allowed_methods();
        methods.contains(&method) || (method == HttpMethod::HEAD && methods.contains(&HttpMethod::GET))
    }

    /// Value of an `Allow` header
    pub fn allow_header(&self) -> String {
        allow_header(self.allowed_methods())
    }

    pub fn required_level(&self) -> u32 {
        match self {
            Target::Link(link) => link.required_level(),
            Target::Static(_) | Target::Cgi { .. } => 0,
        }
    }

    /// Caching permitted before any output exists
    pub fn is_cacheable(&self, caching_enabled: bool) -> bool {
        caching_enabled
            && match self {
                Target::Link(link) => link.caching_allowed(),
                Target::Static(file) => !file.templated,
                Target::Cgi { .. } => false,
            }
    }

    /// Validators known without running any handler
    pub fn validators(&self) -> Validators {
        match self {
            Target::Link(link) => link
                .cached_render()
                .map(|rendered| Validators {
                    etag: Some(hash_etag(&rendered.hash)),
                    modified: Some(rendered.rendered_at),
                })
                .unwrap_or_default(),
            Target::Static(file) => {
                Validators { etag: Some(file.etag.clone()), modified: file.modified }
            }
            Target::Cgi { .. } => Validators::default(),
        }
    }

    /// Produce the content for this request
    pub fn render(&self, request: &LinkRequest<'_>) -> EngineResult<Resource> {
        match self {
            Target::Link(link) => render_link(link, request),
            Target::Static(file) => render_static(file, request),
            Target::Cgi { script, executor } => render_cgi(script, executor.as_ref(), request),
        }
    }
}

pub fn allow_header(methods: &[HttpMethod]) -> String {
    methods.iter().map(HttpMethod::as_str).collect::<Vec<_>>().join(", ")
}

fn hash_etag(hash: &str) -> String {
    format!("\"{}\"", hash)
}

fn render_link(link: &VirtualLink, request: &LinkRequest<'_>) -> EngineResult<Resource> {
    let rendered = link.render(request)?;
    let meta = ResourceMeta {
        mime: link.mime().to_string(),
        size: rendered.content.len() as u64,
        modified: Some(rendered.rendered_at),
        etag: Some(hash_etag(&rendered.hash)),
        kind: ResourceKind::VirtualLink,
        templated: false,
        caching_allowed: link.caching_allowed(),
        content_encoding: None,
        compress_allowed: link.compress_allowed(),
    };
    Ok(Resource { meta, source: ResourceSource::Buffer(rendered.content) })
}

fn render_static(file: &StaticFile, request: &LinkRequest<'_>) -> EngineResult<Resource> {
    let mut meta = ResourceMeta {
        mime: file.mime.clone(),
        size: file.size,
        modified: file.modified,
        etag: Some(file.etag.clone()),
        kind: ResourceKind::Static,
        templated: file.templated,
        caching_allowed: true,
        content_encoding: None,
        compress_allowed: false,
    };

    if file.templated {
        let source = std::fs::read(&file.path)?;
        let text = String::from_utf8_lossy(&source);
        let rendered = template::render(&text, |name| request.session.var_text(name));
        meta.size = rendered.len() as u64;
        meta.etag = None;
        meta.compress_allowed = true;
        return Ok(Resource { meta, source: ResourceSource::Buffer(Bytes::from(rendered)) });
    }

    if let Some((gz_path, gz_size)) = &file.gzip {
        if request.context.zip_allowed() {
            let inode = Inode::open(gz_path)?;
            meta.size = *gz_size;
            meta.content_encoding = Some("gzip");
            meta.etag = Some(format!("{}-gz\"", file.etag.trim_end_matches('"')));
            return Ok(Resource { meta, source: ResourceSource::Inode(inode) });
        }
    }

    let inode = Inode::open(&file.path)?;
    meta.size = inode.size();
    Ok(Resource { meta, source: ResourceSource::Inode(inode) })
}

fn render_cgi(
    script: &std::path::Path,
    executor: &dyn CgiExecutor,
    request: &LinkRequest<'_>,
) -> EngineResult<Resource> {
    let http = request.context.request();
    let cgi_request = CgiRequest {
        script: script.to_path_buf(),
        method: http.method(),
        path: http.path().to_string(),
        query: http.query_params().clone(),
        headers: http.headers().clone(),
        remote_addr: http.remote_addr(),
        body: request.body.cloned().unwrap_or_default(),
    };
    let output = executor
        .execute(&cgi_request)
        .map_err(|err| EngineError::Internal(format!("CGI {} failed: {:#}", script.display(), err)))?;

    let meta = ResourceMeta {
        mime: output.content_type,
        size: output.body.len() as u64,
        modified: Some(Utc::now()),
        etag: None,
        kind: ResourceKind::Cgi,
        templated: false,
        caching_allowed: false,
        content_encoding: None,
        compress_allowed: true,
    };
    Ok(Resource { meta, source: ResourceSource::Buffer(output.body) })
}

/// Path resolution across links, the document root and CGI scripts
#[derive(Debug, Default)]
pub struct Resolver {
    links: LinkRegistry,
    static_root: RwLock<Option<StaticRoot>>,
    cgi: CgiScripts,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    pub fn cgi(&self) -> &CgiScripts {
        &self.cgi
    }

    pub fn set_static_root(&self, root: Option<StaticRoot>) {
        *write(&self.static_root) = root;
    }

    pub fn static_root(&self) -> Option<StaticRoot> {
        read(&self.static_root).clone()
    }

    pub fn resolve(&self, path: &str) -> Option<Target> {
        if let Some(link) = self.links.get(path) {
            return Some(Target::Link(link));
        }
        if let Some(file) = read(&self.static_root).as_ref().and_then(|root| root.locate(path)) {
            return Some(Target::Static(file));
        }
        self.cgi.lookup(path).map(|(script, executor)| Target::Cgi { script, executor })
    }
}
