//! One request from first header to last response byte

use chrono::Utc;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use super::Engine;
use crate::assemble;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::http::constants::headers;
use crate::http::{HttpMethod, HttpResponse};
use crate::negotiate::{self, Conditional};
use crate::post::{PostOutcome, PostProcessor};
use crate::resource::{allow_header, LinkRequest, Resource, Target};
use crate::session::SessionRef;

/// Methods offered when no resource narrows them down
const SERVER_METHODS: &[HttpMethod] = &[
    HttpMethod::GET,
    HttpMethod::HEAD,
    HttpMethod::POST,
    HttpMethod::PUT,
    HttpMethod::DELETE,
    HttpMethod::OPTIONS,
    HttpMethod::PATCH,
];

/// Drives one request through body ingestion, authentication, resolution,
/// negotiation and assembly
///
/// Every component error is turned into a response here. Dropping an
/// exchange before its body completed marks the session's upload as
/// interrupted.
pub struct Exchange<'e> {
    engine: &'e Engine,
    context: RequestContext,
    session: SessionRef,
    post: PostProcessor,
    outcome: Option<PostOutcome>,
    failure: Option<EngineError>,
    body_done: bool,
    started: Instant,
}

impl<'e> Exchange<'e> {
    pub(super) fn new(
        engine: &'e Engine,
        context: RequestContext,
        session: SessionRef,
        post: PostProcessor,
    ) -> Self {
        Self {
            engine,
            context,
            session,
            post,
            outcome: None,
            failure: None,
            body_done: false,
            started: Instant::now(),
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    /// Post state machine phase, for diagnostics
    pub fn body_state(&self) -> &'static str {
        self.post.state_name()
    }

    /// Feed the next body chunk; chunks of bodiless methods are discarded
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.body_done || self.failure.is_some() || !self.context.method().carries_body() {
            return;
        }
        if let Err(err) = self.post.feed(&self.session, chunk) {
            self.failure = Some(err);
        }
    }

    /// The transport saw the end of the body
    pub fn finish_body(&mut self) {
        if self.body_done {
            return;
        }
        self.body_done = true;
        if self.failure.is_some() {
            return;
        }
        match self.post.finish(&self.session) {
            Ok(outcome) => self.outcome = Some(outcome),
            Err(err) => self.failure = Some(err),
        }
    }

    /// The client went away before the body completed
    pub fn abort(&mut self, reason: &str) {
        if !self.body_done {
            self.post.abort(&self.session, reason);
            self.body_done = true;
        }
    }

    /// Produce the response; consumes the exchange and releases the session
    pub fn respond(mut self) -> HttpResponse {
        self.finish_body();

        let result = match self.failure.take() {
            Some(err) => Err(err),
            None => self.dispatch(),
        };
        let mut response = result.unwrap_or_else(|err| self.fail(err));

        let policy = self.engine.cookie_policy();
        for cookie in assemble::session_cookies(self.context.request(), &self.session, policy) {
            response = response.append_header(headers::SET_COOKIE, &cookie);
        }
        if self.context.method() == HttpMethod::HEAD {
            response.strip_body();
        }

        log::info!(
            "{} {} {} {} {:?}",
            self.context.method(),
            self.context.path(),
            response.status().as_u16(),
            self.session.id(),
            self.started.elapsed()
        );
        response
    }

    fn dispatch(&mut self) -> EngineResult<HttpResponse> {
        let method = self.context.method();
        if negotiate::is_forbidden_method(method) {
            return Err(EngineError::MethodNotAllowed {
                method: method.to_string(),
                allow: allow_header(SERVER_METHODS),
            });
        }
        if self.context.is_upgrade() {
            return Err(EngineError::NotImplemented("protocol upgrade".to_string()));
        }

        let target = self.engine.resolver().resolve(self.context.path());
        if method == HttpMethod::OPTIONS {
            let allow = target
                .as_ref()
                .map_or_else(|| allow_header(SERVER_METHODS), Target::allow_header);
            return Ok(HttpResponse::ok()
                .header(headers::ALLOW, &allow)
                .header(headers::CONTENT_LENGTH, "0"));
        }
        let target = target.ok_or_else(|| EngineError::NotFound(self.context.path().to_string()))?;

        let pending_login = {
            let auth = self.session.auth();
            auth.authenticated && !auth.verified
        };
        if target.required_level() > 0 || pending_login {
            self.engine.authenticator().authenticate(
                self.context.request(),
                &self.session,
                target.required_level(),
            )?;
        }

        let caching_enabled = self.engine.config().cache.enabled;
        if target.is_cacheable(caching_enabled) {
            let validators = target.validators();
            if negotiate::precondition_fails(&self.context, validators.etag.as_deref()) {
                return Err(EngineError::PreconditionFailed);
            }
        }
        if !target.allows(method) {
            return Err(EngineError::MethodNotAllowed {
                method: method.to_string(),
                allow: target.allow_header(),
            });
        }

        let outcome = self.outcome.take().unwrap_or_default();
        let mut params = self.context.request().query_params().clone();
        params.extend(outcome.params);
        let resource = self.render(&target, &params, outcome.raw.as_ref())?;

        let cacheable = resource.meta.is_cacheable(caching_enabled);
        let now = Utc::now();
        if cacheable {
            let meta = &resource.meta;
            match negotiate::evaluate(&self.context, meta.etag.as_deref(), meta.modified) {
                Conditional::NotModified => return Ok(assemble::not_modified(meta, now)),
                Conditional::PreconditionFailed => return Err(EngineError::PreconditionFailed),
                Conditional::Proceed => {}
            }
        }

        let served = assemble::select_range(&self.context, &resource.meta)?;
        assemble::assemble(&self.context, resource, served, cacheable, now)
    }

    /// Application code runs here; a panic becomes a 500 for this request only
    fn render(
        &self,
        target: &Target,
        params: &HashMap<String, String>,
        body: Option<&bytes::Bytes>,
    ) -> EngineResult<Resource> {
        let request = LinkRequest { context: &self.context, session: &self.session, params, body };
        match panic::catch_unwind(AssertUnwindSafe(|| target.render(&request))) {
            Ok(result) => result,
            Err(payload) => {
                let cause = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EngineError::Internal(format!("handler panicked: {}", cause)))
            }
        }
    }

    fn fail(&self, err: EngineError) -> HttpResponse {
        let path = self.context.path();
        match &err {
            EngineError::NotFound(_) => log::info!("Not found: {}", path),
            EngineError::AuthChallenge { .. } | EngineError::Forbidden(_) => {
                log::debug!("Access to {} refused: {}", path, err)
            }
            err if err.is_internal() => log::error!("Request {} failed: {}", path, err),
            err => log::debug!("Request {} rejected: {}", path, err),
        }
        assemble::error_response(&err, self.engine.authenticator())
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.body_done {
            self.post.abort(&self.session, "exchange dropped before the body completed");
        }
    }
}
