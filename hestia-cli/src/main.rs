//! Hestia daemon.
//!
//! ```bash
//! hestia serve --config hestia.toml --root ./public
//! hestia check-config --config hestia.toml
//! ```
//!
//! See `hestia --help` for all available commands and options.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hestia", about = "Hestia embedded application server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the engine until SIGINT or SIGTERM
    Serve {
        /// Configuration file (defaults to ./hestia.toml when present)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Listen address, overriding configuration and environment
        #[arg(long)]
        host: Option<String>,

        /// Listen port, overriding configuration and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Document root for static files
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Load and validate the configuration, then print it
    CheckConfig {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, host, port, root } => {
            let overrides = commands::serve::Overrides { host, port, root };
            commands::serve::run(config.as_deref(), overrides)
        }
        Commands::CheckConfig { config } => commands::check::run(config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
