//! Sessions configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::http::SameSitePolicy;

/// Sessions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Minimum idle seconds before a session may be repurposed for another
    /// cookieless request from the same address
    /// Env: HS_SESSION_REUSE_MIN_IDLE
    /// Default: 60
    pub reuse_min_idle: u64,

    /// Idle seconds after which an unreferenced session is garbage-collected
    /// Env: HS_SESSION_MAX_AGE
    /// Default: 3600 (1 hour)
    pub max_age: u64,

    /// SameSite policy: "Strict", "Lax", or "None"
    /// Env: HS_SESSION_COOKIE_SAMESITE
    /// Default: "Lax"
    pub cookie_samesite: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { reuse_min_idle: 60, max_age: 3600, cookie_samesite: "Lax".to_string() }
    }
}

impl SessionsConfig {
    pub fn merge(&mut self, other: Self) {
        self.reuse_min_idle = other.reuse_min_idle;
        self.max_age = other.max_age;
        self.cookie_samesite = other.cookie_samesite;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(idle) = env::var("HS_SESSION_REUSE_MIN_IDLE") {
            if let Ok(i) = idle.parse() {
                self.reuse_min_idle = i;
            }
        }

        if let Ok(max_age) = env::var("HS_SESSION_MAX_AGE") {
            if let Ok(m) = max_age.parse() {
                self.max_age = m;
            }
        }

        if let Ok(samesite) = env::var("HS_SESSION_COOKIE_SAMESITE") {
            self.cookie_samesite = samesite;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_age == 0 {
            bail!("Invalid max_age: must be greater than 0");
        }

        if self.cookie_samesite.parse::<SameSitePolicy>().is_err() {
            bail!("Invalid cookie_samesite: must be Strict, Lax, or None");
        }

        Ok(())
    }

    pub fn reuse_min_idle(&self) -> Duration {
        Duration::from_secs(self.reuse_min_idle)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }

    /// Parsed SameSite policy, `Lax` when the configured value is invalid
    pub fn same_site(&self) -> SameSitePolicy {
        self.cookie_samesite.parse().unwrap_or(SameSitePolicy::Lax)
    }
}
