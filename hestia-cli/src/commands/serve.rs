use anyhow::{Context, Result};
use hestia_core::config::HestiaConfig;
use hestia_core::logging::init_logging;
use hestia_core::server::HestiaServer;
use std::path::{Path, PathBuf};

use super::load_config;

/// Command-line values that win over file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut HestiaConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.root {
            config.static_files.root = Some(root.to_string_lossy().into_owned());
        }
    }
}

pub fn run(path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let mut config = load_config(path)?;
    overrides.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging.to_runtime()).context("Failed to initialize logging")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the tokio runtime")?;
    runtime.block_on(async move {
        let server = HestiaServer::new(config)?;
        server.serve_with_shutdown(shutdown_signal()).await
    })
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for SIGINT: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => log::info!("SIGINT received"),
        _ = terminate => log::info!("SIGTERM received"),
    }
}
