//! tftpvault daemon
//!
//! Serves a single directory over TFTP. Every request path from the network
//! is confined to that directory by the `vault` core before any file I/O.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use vault::{FileServer, PathResolver};

use crate::config::Config;

mod config;
mod engine;

/// tftpvault - serve a confined directory over TFTP.
#[derive(Parser, Debug)]
#[command(name = "tftpvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the TFTP server
    Serve {
        /// Host address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port number to bind
        #[arg(long)]
        port: Option<u16>,

        /// Directory to serve as the trusted root
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve { host, port, root } => {
            // Command-line flags take precedence over the config file
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = root {
                config.store.root = root;
            }

            config.validate()?;

            let resolver = PathResolver::new(&config.store.root).with_context(|| {
                format!(
                    "cannot serve {}: not an existing directory",
                    config.store.root.display()
                )
            })?;

            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .with_context(|| {
                    format!(
                        "invalid bind address {}:{}",
                        config.server.host, config.server.port
                    )
                })?;

            tracing::info!(
                host = %config.server.host,
                port = config.server.port,
                directory = %resolver.root().display(),
                "starting TFTP server"
            );

            engine::serve(
                FileServer::new(resolver),
                addr,
                Duration::from_secs(config.server.timeout_secs),
            )
            .await
        }
    }
}
