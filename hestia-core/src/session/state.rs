//! One client's server-side state

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use super::transfer::TransferState;
use super::user_agent::UserAgentClass;
use crate::sync::{lock, read, write};

/// Variable holding the client address the session was created for
pub const REMOTE_HOST_VAR: &str = "remote_host";

/// Authentication state of a session
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub authenticated: bool,
    /// False while a form login awaits checking against the credential table
    pub verified: bool,
    pub anonymous: bool,
    pub username: Option<String>,
    /// Only kept for a pending form login; cleared once verified
    pub password: Option<String>,
    pub level: u32,
    pub authenticated_at: Option<Instant>,
    /// Set by application code to end the login on the next request
    pub forced_logoff: bool,
}

impl AuthState {
    pub fn login(&mut self, username: &str, level: u32) {
        *self = AuthState {
            authenticated: true,
            verified: true,
            username: Some(username.to_string()),
            level,
            authenticated_at: Some(Instant::now()),
            ..Default::default()
        };
    }

    pub fn login_anonymous(&mut self, level: u32) {
        *self = AuthState {
            authenticated: true,
            verified: true,
            anonymous: true,
            level,
            authenticated_at: Some(Instant::now()),
            ..Default::default()
        };
    }

    /// Form login: credentials recorded, verification left to the authenticator
    pub fn login_pending(&mut self, username: &str, password: &str) {
        *self = AuthState {
            authenticated: true,
            verified: false,
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            authenticated_at: Some(Instant::now()),
            ..Default::default()
        };
    }

    pub fn logoff(&mut self) {
        *self = AuthState::default();
    }

    /// Verified login still inside `timeout` (zero never expires)
    pub fn is_current(&self, timeout: Duration) -> bool {
        if !self.authenticated || !self.verified {
            return false;
        }
        if timeout.is_zero() {
            return true;
        }
        self.authenticated_at.is_some_and(|at| at.elapsed() <= timeout)
    }

    pub fn refresh(&mut self) {
        self.authenticated_at = Some(Instant::now());
    }
}

/// Server-side state for one client
///
/// Variables and cookies sit behind their own read/write locks so requests on
/// different sessions never contend, and readers of one session proceed
/// concurrently.
#[derive(Debug)]
pub struct Session {
    id: String,
    remote_ip: Option<IpAddr>,
    ref_count: AtomicUsize,
    use_count: AtomicU64,
    created_at: chrono::DateTime<chrono::Utc>,
    last_activity: Mutex<Instant>,
    user_agent: RwLock<UserAgentClass>,
    auth: Mutex<AuthState>,
    variables: RwLock<HashMap<String, serde_json::Value>>,
    cookies: RwLock<HashMap<String, String>>,
    transfer: Mutex<TransferState>,
}

impl Session {
    pub(crate) fn new(id: String, remote_ip: Option<IpAddr>) -> Self {
        let session = Self {
            id,
            remote_ip,
            ref_count: AtomicUsize::new(0),
            use_count: AtomicU64::new(0),
            created_at: chrono::Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            user_agent: RwLock::new(UserAgentClass::Unknown),
            auth: Mutex::new(AuthState::default()),
            variables: RwLock::new(HashMap::new()),
            cookies: RwLock::new(HashMap::new()),
            transfer: Mutex::new(TransferState::default()),
        };
        session.seed_variables();
        session
    }

    fn seed_variables(&self) {
        if let Some(ip) = self.remote_ip {
            write(&self.variables)
                .insert(REMOTE_HOST_VAR.to_string(), serde_json::Value::String(ip.to_string()));
        }
    }

    /// Wipe all client state before the session is handed to another request
    ///
    /// Refuses while an upload or post is in flight. The transfer lock is held
    /// from the busy check until the wipe completes.
    pub(crate) fn reset_if_idle(&self) -> bool {
        let mut transfer = lock(&self.transfer);
        if transfer.is_busy() {
            return false;
        }
        *transfer = TransferState::default();
        write(&self.variables).clear();
        write(&self.cookies).clear();
        *lock(&self.auth) = AuthState::default();
        *write(&self.user_agent) = UserAgentClass::Unknown;
        self.use_count.store(0, Ordering::SeqCst);
        self.touch();
        self.seed_variables();
        true
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    /// Requests currently holding this session
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// Requests served over the session's lifetime
    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub(crate) fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
        self.use_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        // Saturating, so the closure always yields a value and the update cannot fail
        self.ref_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .ok();
        self.touch();
    }

    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    pub fn user_agent(&self) -> UserAgentClass {
        *read(&self.user_agent)
    }

    pub fn set_user_agent(&self, class: UserAgentClass) {
        *write(&self.user_agent) = class;
    }

    /// Snapshot of the authentication state
    pub fn auth_state(&self) -> AuthState {
        lock(&self.auth).clone()
    }

    /// Exclusive access to the authentication state
    pub fn auth(&self) -> MutexGuard<'_, AuthState> {
        lock(&self.auth)
    }

    pub fn is_authenticated(&self) -> bool {
        let auth = lock(&self.auth);
        auth.authenticated && auth.verified
    }

    pub fn level(&self) -> u32 {
        lock(&self.auth).level
    }

    /// Ask for the current login to end on the next authenticated request
    pub fn force_logoff(&self) {
        lock(&self.auth).forced_logoff = true;
    }

    /// Exclusive access to the upload/post sub-state
    pub fn transfer(&self) -> MutexGuard<'_, TransferState> {
        lock(&self.transfer)
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.transfer).is_busy()
    }

    // Variables

    pub fn get_var<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        read(&self.variables).get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_var<T: Serialize>(&self, key: impl Into<String>, value: T) -> anyhow::Result<()> {
        let json_value = serde_json::to_value(value)?;
        write(&self.variables).insert(key.into(), json_value);
        Ok(())
    }

    pub fn set_raw_var(&self, key: impl Into<String>, value: serde_json::Value) {
        write(&self.variables).insert(key.into(), value);
    }

    pub fn remove_var(&self, key: &str) -> Option<serde_json::Value> {
        write(&self.variables).remove(key)
    }

    /// Variable rendered as text: strings verbatim, other values as JSON
    pub fn var_text(&self, key: &str) -> Option<String> {
        read(&self.variables).get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn variables(&self) -> HashMap<String, serde_json::Value> {
        read(&self.variables).clone()
    }

    // Application cookies

    pub fn cookie(&self, name: &str) -> Option<String> {
        read(&self.cookies).get(name).cloned()
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        write(&self.cookies).insert(name.into(), value.into());
    }

    pub fn remove_cookie(&self, name: &str) -> Option<String> {
        write(&self.cookies).remove(name)
    }

    pub fn cookies(&self) -> HashMap<String, String> {
        read(&self.cookies).clone()
    }
}
