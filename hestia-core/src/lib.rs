//! Hestia - Core
//!
//! An embedded application framework built around an in-process HTTP
//! engine. The engine turns an already-parsed request into a correctly
//! negotiated response: it binds the request to a session, ingests the body,
//! authenticates, resolves the resource, evaluates cache validators and byte
//! ranges, and assembles headers, cookies and body.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hestia_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     HestiaServer::new(HestiaConfig::load()?)?
//!         .with_link(VirtualLink::new("/data.json", "application/json", |_req| {
//!             Ok(r#"{"total":0,"rows":[]}"#.into())
//!         }))
//!         .serve()
//!         .await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`engine`] - per-request [`engine::Exchange`] driving every component
//! - [`session`] - session store, RAII session references, per-session state
//! - [`context`] - lazily memoized header classification
//! - [`post`] - body state machine (form decoding, uploads, raw buffering)
//! - [`auth`] - HTTP Digest authentication with anonymous fallback
//! - [`resource`] - virtual links, static files, templates and CGI
//! - [`negotiate`] - conditional requests and caching headers
//! - [`range`] - byte ranges and the inode streamer
//! - [`assemble`] - response assembly, error responses, cookies
//! - [`server`] - hyper host transport
//! - [`config`] / [`logging`] - configuration layers and the `log` backend

pub mod assemble;
pub mod auth;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod negotiate;
pub mod post;
pub mod range;
pub mod resource;
pub mod server;
pub mod session;
mod sync;

pub use engine::{Engine, Exchange};
pub use error::{EngineError, EngineResult};
pub use server::HestiaServer;

/// Convenience re-exports for applications embedding the engine
pub mod prelude {
    pub use crate::config::HestiaConfig;
    pub use crate::engine::{Engine, Exchange};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, StatusCode};
    pub use crate::logging::init_logging;
    pub use crate::resource::{CgiExecutor, LinkRequest, VirtualLink};
    pub use crate::server::HestiaServer;
    pub use crate::session::{Session, SessionRef};
}
