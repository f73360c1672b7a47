//! Authentication configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// One credential table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    /// Plain password; ignored when `ha1` is set
    #[serde(default)]
    pub password: Option<String>,
    /// Precomputed hex `H(name:realm:password)` for the configured algorithm
    #[serde(default)]
    pub ha1: Option<String>,
    pub level: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Digest realm
    /// Env: HS_AUTH_REALM
    /// Default: "hestia"
    pub realm: String,

    /// Digest algorithm: "MD5" or "SHA-256"
    /// Env: HS_AUTH_ALGORITHM
    /// Default: "MD5"
    pub algorithm: String,

    /// Seconds an authenticated session stays valid; 0 never expires
    /// Env: HS_AUTH_TIMEOUT
    /// Default: 3600
    pub timeout: u64,

    /// Anonymous privilege level granted on failure; 0 disables the fallback
    /// Env: HS_AUTH_DEFAULT_LEVEL
    /// Default: 0
    pub default_level: u32,

    /// Form field carrying the login name
    pub login_user_field: String,

    /// Form field carrying the login password
    pub login_password_field: String,

    /// Key used to sign nonces; random per process when unset
    /// Env: HS_AUTH_NONCE_SECRET
    pub nonce_secret: Option<String>,

    /// Credential table
    pub users: Vec<UserEntry>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "hestia".to_string(),
            algorithm: "MD5".to_string(),
            timeout: 3600,
            default_level: 0,
            login_user_field: "login_user".to_string(),
            login_password_field: "login_password".to_string(),
            nonce_secret: None,
            users: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(realm) = env::var("HS_AUTH_REALM") {
            self.realm = realm;
        }

        if let Ok(algorithm) = env::var("HS_AUTH_ALGORITHM") {
            self.algorithm = algorithm;
        }

        if let Ok(timeout) = env::var("HS_AUTH_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.timeout = t;
            }
        }

        if let Ok(level) = env::var("HS_AUTH_DEFAULT_LEVEL") {
            if let Ok(l) = level.parse() {
                self.default_level = l;
            }
        }

        if let Ok(secret) = env::var("HS_AUTH_NONCE_SECRET") {
            self.nonce_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.realm.is_empty() || self.realm.contains('"') {
            bail!("Invalid realm: must be non-empty and contain no quotes");
        }

        if !["MD5", "SHA-256"].contains(&self.algorithm.as_str()) {
            bail!("Invalid algorithm: must be MD5 or SHA-256");
        }

        for user in &self.users {
            if user.name.is_empty() || user.name.contains(':') {
                bail!("Invalid user name {:?}: must be non-empty without ':'", user.name);
            }
            if user.password.is_none() && user.ha1.is_none() {
                bail!("User {} needs either a password or an ha1", user.name);
            }
        }

        Ok(())
    }
}
