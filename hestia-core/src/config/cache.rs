//! Response caching configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Allow cache-stamping of static content; when false every response is
    /// `no-store` and the session cookie has no fixed age
    /// Env: HS_CACHE_ENABLED
    pub enabled: bool,

    /// Allow gzip content encoding
    /// Env: HS_ZIP_ENABLED
    pub zip_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, zip_enabled: true }
    }
}

impl CacheConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(enabled) = env::var("HS_CACHE_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(enabled) = env::var("HS_ZIP_ENABLED") {
            self.zip_enabled = enabled.parse().unwrap_or(true);
        }
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
