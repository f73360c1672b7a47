pub mod check;
pub mod serve;

use anyhow::Result;
use hestia_core::config::HestiaConfig;
use std::path::Path;

/// Defaults, then the file (explicit or `./hestia.toml`), then `HS_*` variables
pub fn load_config(path: Option<&Path>) -> Result<HestiaConfig> {
    match path {
        Some(path) => {
            anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
            HestiaConfig::load_from(path)
        }
        None => HestiaConfig::load(),
    }
}
