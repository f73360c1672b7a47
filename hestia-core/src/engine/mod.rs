//! Request-lifecycle engine
//!
//! [`Engine`] owns the long-lived pieces (session store, authenticator,
//! resource resolver) and hands out one [`Exchange`] per request. The host
//! transport feeds body chunks into the exchange and asks it for the
//! response once the body is complete.
//!
//! # Example
//!
//! ```rust
//! use hestia_core::config::HestiaConfig;
//! use hestia_core::engine::Engine;
//! use hestia_core::http::{HttpMethod, HttpRequest, StatusCode};
//! use hestia_core::resource::VirtualLink;
//!
//! let engine = Engine::new(HestiaConfig::default())?;
//! engine.register_link(VirtualLink::new("/data.json", "application/json", |_req| {
//!     Ok(r#"{"total":0,"rows":[]}"#.into())
//! }));
//!
//! let response = engine.handle(HttpRequest::new(HttpMethod::GET, "/data.json"), &[]);
//! assert_eq!(response.status(), StatusCode::Ok);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod exchange;

pub use exchange::Exchange;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assemble::CookiePolicy;
use crate::auth::Authenticator;
use crate::config::HestiaConfig;
use crate::context::RequestContext;
use crate::http::constants::headers;
use crate::http::{HttpRequest, HttpResponse};
use crate::post::{PostProcessor, PostSettings};
use crate::resource::{CgiScripts, LinkRegistry, Resolver, StaticRoot, VirtualLink};
use crate::session::{SessionStore, UserAgentClass};

pub struct Engine {
    config: HestiaConfig,
    sessions: SessionStore,
    authenticator: Authenticator,
    resolver: Resolver,
    post_settings: PostSettings,
}

impl Engine {
    pub fn new(config: HestiaConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid configuration")?;

        let authenticator =
            Authenticator::from_config(&config.auth).context("Failed to set up authentication")?;

        let resolver = Resolver::new();
        if let Some(root) = &config.static_files.root {
            let root = StaticRoot::new(root, config.static_files.templated_suffixes.clone())
                .with_context(|| format!("Invalid document root {}", root))?;
            log::info!("Serving static files from {}", root.root().display());
            resolver.set_static_root(Some(root));
        }

        let post_settings = PostSettings {
            max_body_size: config.server.max_body_size,
            upload_dir: PathBuf::from(&config.static_files.upload_dir),
            login_user_field: config.auth.login_user_field.clone(),
            login_password_field: config.auth.login_password_field.clone(),
        };

        Ok(Self {
            sessions: SessionStore::new(config.sessions.reuse_min_idle()),
            authenticator,
            resolver,
            post_settings,
            config,
        })
    }

    pub fn config(&self) -> &HestiaConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn links(&self) -> &LinkRegistry {
        self.resolver.links()
    }

    pub fn cgi(&self) -> &CgiScripts {
        self.resolver.cgi()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn register_link(&self, link: VirtualLink) -> Arc<VirtualLink> {
        self.resolver.links().register(link)
    }

    pub(crate) fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            same_site: self.config.sessions.same_site(),
            persistent: self.config.cache.enabled,
            tls: self.config.server.tls,
        }
    }

    /// Start an exchange: classify the request and bind it to a session
    pub fn begin(&self, request: HttpRequest) -> Exchange<'_> {
        let session = self.sessions.find_or_create(&request);
        session.set_user_agent(UserAgentClass::classify(request.header_value(headers::USER_AGENT)));

        let context = RequestContext::new(request, self.config.cache.zip_enabled);
        let post = PostProcessor::new(
            self.post_settings.clone(),
            context.content_type(),
            context.content_length(),
        );
        Exchange::new(self, context, session, post)
    }

    /// Run a request whose body is already in memory
    pub fn handle(&self, request: HttpRequest, body: &[u8]) -> HttpResponse {
        let mut exchange = self.begin(request);
        exchange.feed(body);
        exchange.respond()
    }

    /// Sweep idle sessions; returns how many were removed
    pub fn collect_garbage(&self) -> usize {
        let removed = self.sessions.garbage_collect(self.config.sessions.max_age());
        if removed > 0 {
            log::debug!("Collected {} idle sessions, {} remain", removed, self.sessions.len());
        }
        removed
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.sessions.len())
            .field("links", &self.resolver.links().len())
            .finish_non_exhaustive()
    }
}
