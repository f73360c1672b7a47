//! Server configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listening port
    /// Env: HS_PORT
    /// Default: 8080
    pub port: u16,

    /// Server listening address
    /// Env: HS_HOST
    /// Default: "127.0.0.1"
    pub host: String,

    /// Requests arrive TLS-terminated (cookies get the Secure flag)
    /// Env: HS_TLS
    /// Default: false
    pub tls: bool,

    /// Maximum request body size in bytes
    /// Env: HS_MAX_BODY_SIZE
    /// Default: 16777216 (16MB)
    pub max_body_size: usize,

    /// Seconds between session garbage-collection sweeps
    /// Env: HS_GC_INTERVAL
    /// Default: 300
    pub gc_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            tls: false,
            max_body_size: 16 * 1024 * 1024,
            gc_interval: 300,
        }
    }
}

impl ServerConfig {
    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.port = other.port;
        self.host = other.host;
        self.tls = other.tls;
        self.max_body_size = other.max_body_size;
        self.gc_interval = other.gc_interval;
    }

    /// Apply environment variables
    pub fn apply_env_vars(&mut self) {
        if let Ok(port) = env::var("HS_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        if let Ok(host) = env::var("HS_HOST") {
            self.host = host;
        }

        if let Ok(tls) = env::var("HS_TLS") {
            self.tls = tls.parse().unwrap_or(false);
        }

        if let Ok(size) = env::var("HS_MAX_BODY_SIZE") {
            if let Ok(s) = size.parse() {
                self.max_body_size = s;
            }
        }

        if let Ok(interval) = env::var("HS_GC_INTERVAL") {
            if let Ok(i) = interval.parse() {
                self.gc_interval = i;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Invalid port: must be greater than 0");
        }

        if self.host.is_empty() {
            bail!("Invalid host: cannot be empty");
        }

        if self.max_body_size == 0 {
            bail!("Invalid max_body_size: must be greater than 0");
        }

        if self.gc_interval == 0 {
            bail!("Invalid gc_interval: must be greater than 0");
        }

        Ok(())
    }

    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
