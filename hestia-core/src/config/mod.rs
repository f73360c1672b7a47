//! Configuration system for Hestia
//!
//! Configuration values are resolved in the following order (highest priority wins):
//!
//! 1. **Code** (builder methods on [`crate::server::HestiaServer`])
//! 2. **Environment Variables** (`HS_*`)
//! 3. **Config File** (`hestia.toml`)
//! 4. **Defaults**
//!
//! # Example
//!
//! ```no_run
//! use hestia_core::config::HestiaConfig;
//!
//! let config = HestiaConfig::load()?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod auth;
pub mod cache;
pub mod logging;
pub mod server;
pub mod sessions;
pub mod static_files;

pub use auth::{AuthConfig, UserEntry};
pub use cache::CacheConfig;
pub use logging::LoggingConfig;
pub use server::ServerConfig;
pub use sessions::SessionsConfig;
pub use static_files::StaticFilesConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Hestia configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HestiaConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    #[serde(rename = "static")]
    pub static_files: StaticFilesConfig,
    pub logging: LoggingConfig,
}

impl HestiaConfig {
    /// Load configuration with full supersedence chain
    pub fn load() -> Result<Self> {
        Self::load_from("hestia.toml")
    }

    /// Load configuration from a specific file, then apply the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = Self::default();

        if path.exists() {
            let file_config = Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.merge(file_config);
        }

        config.apply_env_vars();

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.as_ref().display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML, the same shape [`HestiaConfig::from_toml`] reads
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.server.merge(other.server);
        self.sessions.merge(other.sessions);
        self.auth.merge(other.auth);
        self.cache.merge(other.cache);
        self.static_files.merge(other.static_files);
        self.logging.merge(other.logging);
    }

    /// Apply environment variables to configuration
    pub fn apply_env_vars(&mut self) {
        self.server.apply_env_vars();
        self.sessions.apply_env_vars();
        self.auth.apply_env_vars();
        self.cache.apply_env_vars();
        self.static_files.apply_env_vars();
        self.logging.apply_env_vars();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.sessions.validate()?;
        self.auth.validate()?;
        self.cache.validate()?;
        self.static_files.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
