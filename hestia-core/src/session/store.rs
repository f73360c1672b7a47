//! Concurrent session map with address-bound reuse
//!
//! Structural changes (insert, scan, erase) and reference acquisition happen
//! under one store-wide mutex. Everything else goes through the per-session
//! locks in [`Session`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::sync::lock;
use super::state::Session;
use crate::http::constants::{cookies, headers};
use crate::http::{parse_cookie_header, HttpRequest};

/// Live handle on a session
///
/// Holding one counts as a reference: the store will neither collect nor
/// repurpose the session until every `SessionRef` is dropped. Dropping
/// refreshes the session's last-activity time.
#[derive(Debug)]
pub struct SessionRef {
    session: Arc<Session>,
}

impl SessionRef {
    fn acquire(session: Arc<Session>) -> Self {
        session.acquire();
        Self { session }
    }

    /// Shared pointer for collaborators that outlive the guard's borrow
    pub fn shared(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }
}

impl Clone for SessionRef {
    fn clone(&self) -> Self {
        self.session.add_ref();
        Self { session: Arc::clone(&self.session) }
    }
}

impl Deref for SessionRef {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionRef {
    fn drop(&mut self) {
        self.session.release();
    }
}

/// Store of all live sessions
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    reuse_min_idle: Duration,
}

impl SessionStore {
    /// `reuse_min_idle` is how long a session must sit unreferenced before a
    /// cookieless request from the same address may take it over
    pub fn new(reuse_min_idle: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), reuse_min_idle }
    }

    /// Resolve the session for a request from its cookie and peer address
    pub fn find_or_create(&self, request: &HttpRequest) -> SessionRef {
        let offered = request
            .header_value(headers::COOKIE)
            .and_then(|header| parse_cookie_header(header).remove(cookies::SESSION));
        self.resolve(offered.as_deref(), request.remote_addr().map(|addr| addr.ip()))
    }

    /// Lookup order: live cookie match, idle same-address session, new session
    pub fn resolve(&self, offered_id: Option<&str>, remote_ip: Option<IpAddr>) -> SessionRef {
        let mut sessions = lock(&self.sessions);

        if let Some(id) = offered_id {
            if let Some(session) = sessions.get(id) {
                return SessionRef::acquire(Arc::clone(session));
            }
        }

        if let Some(ip) = remote_ip {
            let candidate = sessions
                .values()
                .filter(|session| self.is_reusable_for(session, ip))
                .find(|session| session.reset_if_idle())
                .map(Arc::clone);
            if let Some(session) = candidate {
                log::debug!("Reusing idle session {} for {}", session.id(), ip);
                return SessionRef::acquire(session);
            }
        }

        let id = offered_id
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(|uuid| uuid.to_string())
            .filter(|id| !sessions.contains_key(id))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let session = Arc::new(Session::new(id.clone(), remote_ip));
        sessions.insert(id, Arc::clone(&session));
        log::debug!("Created session {} ({} live)", session.id(), sessions.len());
        SessionRef::acquire(session)
    }

    /// The busy check happens in `Session::reset_if_idle`, under the transfer lock
    fn is_reusable_for(&self, session: &Session, ip: IpAddr) -> bool {
        session.ref_count() == 0
            && session.remote_ip() == Some(ip)
            && session.idle_for() > self.reuse_min_idle
    }

    /// Remove unreferenced sessions idle longer than `max_age`; returns the count removed
    pub fn garbage_collect(&self, max_age: Duration) -> usize {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| session.ref_count() > 0 || session.idle_for() <= max_age);
        let removed = before - sessions.len();
        if removed > 0 {
            log::info!("Session sweep removed {} of {} sessions", removed, before);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use std::thread;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_cookie_match_returns_same_session() {
        let store = SessionStore::default();
        let first = store.resolve(None, ip("10.0.0.1"));
        let id = first.id().to_string();
        drop(first);

        let request = HttpRequest::new(HttpMethod::GET, "/")
            .header("Cookie", &format!("other=1; hestia_session={}", id));
        let again = store.find_or_create(&request);
        assert_eq!(again.id(), id);
        assert_eq!(again.use_count(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stale_uuid_cookie_seeds_new_id() {
        let store = SessionStore::default();
        let stale = "4f9d1c2e-8b7a-4c3d-9e1f-0a2b3c4d5e6f";
        let session = store.resolve(Some(stale), ip("10.0.0.1"));
        assert_eq!(session.id(), stale);

        let garbage = store.resolve(Some("not-a-uuid"), ip("10.0.0.2"));
        assert_ne!(garbage.id(), "not-a-uuid");
        assert!(Uuid::parse_str(garbage.id()).is_ok());
    }

    #[test]
    fn test_reuse_is_bound_to_remote_address() {
        let store = SessionStore::new(Duration::from_millis(20));
        let first = store.resolve(None, ip("10.0.0.1"));
        let id = first.id().to_string();
        drop(first);

        thread::sleep(Duration::from_millis(40));

        let other = store.resolve(None, ip("10.0.0.2"));
        assert_ne!(other.id(), id);

        let same = store.resolve(None, ip("10.0.0.1"));
        assert_eq!(same.id(), id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_recently_active_session_is_not_reused() {
        let store = SessionStore::new(Duration::from_secs(60));
        let first = store.resolve(None, ip("10.0.0.1"));
        let id = first.id().to_string();
        drop(first);

        let second = store.resolve(None, ip("10.0.0.1"));
        assert_ne!(second.id(), id);
    }

    #[test]
    fn test_referenced_session_is_not_reused() {
        let store = SessionStore::new(Duration::ZERO);
        let first = store.resolve(None, ip("10.0.0.1"));
        thread::sleep(Duration::from_millis(5));

        let second = store.resolve(None, ip("10.0.0.1"));
        assert_ne!(second.id(), first.id());
    }

    #[test]
    fn test_reuse_resets_state() {
        let store = SessionStore::new(Duration::from_millis(10));
        let first = store.resolve(None, ip("192.168.1.9"));
        let id = first.id().to_string();
        first.set_var("cart", 3).unwrap();
        drop(first);
        thread::sleep(Duration::from_millis(30));

        let reused = store.resolve(None, ip("192.168.1.9"));
        assert_eq!(reused.id(), id);
        assert!(reused.get_var::<u32>("cart").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_busy_session_is_not_reused() {
        let store = SessionStore::new(Duration::from_millis(10));
        let first = store.resolve(None, ip("192.168.1.9"));
        let id = first.id().to_string();
        first.transfer().upload.begin(Some(100));
        drop(first);
        thread::sleep(Duration::from_millis(30));

        let next = store.resolve(None, ip("192.168.1.9"));
        assert_ne!(next.id(), id);
    }

    #[test]
    fn test_reference_counting_and_gc() {
        let store = Arc::new(SessionStore::default());
        let session = store.resolve(None, ip("10.0.0.1"));
        let id = session.id().to_string();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || store.resolve(Some(&id), None))
            })
            .collect();
        let refs: Vec<SessionRef> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(session.ref_count(), 9);
        assert_eq!(store.garbage_collect(Duration::ZERO), 0);
        assert!(store.contains(&id));

        drop(refs);
        assert_eq!(session.ref_count(), 1);
        drop(session);

        thread::sleep(Duration::from_millis(5));
        assert_eq!(store.garbage_collect(Duration::from_secs(3600)), 0);
        assert_eq!(store.garbage_collect(Duration::ZERO), 1);
        assert!(store.is_empty());
    }
}
