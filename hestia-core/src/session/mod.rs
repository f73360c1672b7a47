//! Session store and per-session state
//!
//! A session is the server-side state behind the `hestia_session` cookie. The
//! store owns every session behind an `Arc`; requests hold a [`SessionRef`]
//! guard whose lifetime is the session's reference count, so a session can
//! never be collected or repurposed while a request is using it.
//!
//! # Example
//!
//! ```rust
//! use hestia_core::http::{HttpMethod, HttpRequest};
//! use hestia_core::session::SessionStore;
//! use std::time::Duration;
//!
//! let store = SessionStore::new(Duration::from_secs(60));
//! let request = HttpRequest::new(HttpMethod::GET, "/").remote("10.0.0.1:5000".parse().unwrap());
//! let session = store.find_or_create(&request);
//! session.set_var("theme", "dark").unwrap();
//! assert_eq!(session.get_var::<String>("theme").as_deref(), Some("dark"));
//! ```

pub mod state;
pub mod store;
pub mod transfer;
pub mod user_agent;

pub use state::{AuthState, Session};
pub use store::{SessionRef, SessionStore};
pub use transfer::{PostState, TransferState, UploadState, UploadStatus};
pub use user_agent::UserAgentClass;
