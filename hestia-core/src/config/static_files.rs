//! Static file and upload configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Document root; static serving is disabled when unset
    /// Env: HS_STATIC_ROOT
    pub root: Option<String>,

    /// Directory receiving multipart file uploads
    /// Env: HS_UPLOAD_DIR
    /// Default: "./uploads"
    pub upload_dir: String,

    /// File suffixes rendered through `${name}` token substitution
    pub templated_suffixes: Vec<String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self { root: None, upload_dir: "./uploads".to_string(), templated_suffixes: Vec::new() }
    }
}

impl StaticFilesConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(root) = env::var("HS_STATIC_ROOT") {
            self.root = Some(root);
        }
        if let Ok(dir) = env::var("HS_UPLOAD_DIR") {
            self.upload_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_dir.is_empty() {
            bail!("Invalid upload_dir: cannot be empty");
        }
        Ok(())
    }
}
