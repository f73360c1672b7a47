//! Logging configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::logging::{LogFormat, LogLevel, LogOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env: HS_LOG_LEVEL
    pub level: String,
    /// "human", "json" or "logfmt"
    /// Env: HS_LOG_FORMAT
    pub format: String,
    /// Append to this file instead of stdout
    /// Env: HS_LOG_FILE
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "human".to_string(), file_path: None }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("HS_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("HS_LOG_FORMAT") {
            self.format = format;
        }
        if let Ok(path) = env::var("HS_LOG_FILE") {
            self.file_path = Some(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.level.parse::<LogLevel>().is_err() {
            bail!("Invalid log level: {}", self.level);
        }
        if self.format.parse::<LogFormat>().is_err() {
            bail!("Invalid log format: {}", self.format);
        }
        Ok(())
    }

    /// Translate into the runtime logger configuration
    pub fn to_runtime(&self) -> crate::logging::LoggingConfig {
        let level = self.level.parse().unwrap_or(LogLevel::Info);
        let format = self.format.parse().unwrap_or(LogFormat::Human);
        let mut runtime = crate::logging::LoggingConfig::default().with_level(level);
        runtime.format = format;
        if let Some(path) = &self.file_path {
            runtime.outputs = vec![LogOutput::File { path: path.clone() }];
        }
        runtime
    }
}
