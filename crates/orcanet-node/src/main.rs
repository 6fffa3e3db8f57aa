//! OrcaNet Node: entry point.
//!
//! Starts the node with configuration from a TOML file or defaults.

// Node internals expose accessors used only by tests.
#![allow(dead_code)]

mod api;
mod config;
mod node;
mod payment;
mod state;
mod storage;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::OrcaConfig;
use node::OrcaFullNode;

/// OrcaNet Node
#[derive(Parser, Debug)]
#[command(name = "orcanet-node", version, about = "OrcaNet peer-to-peer file sharing node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "orcanet.toml")]
    config: PathBuf,

    /// Seed the node identity is derived from.
    #[arg(long)]
    seed: Option<String>,

    /// Override the P2P listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the API port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the relay multiaddress.
    #[arg(long)]
    relay: Option<String>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle --init flag
    if args.init {
        init_tracing(args.log_level.as_deref().unwrap_or("info"), "text");
        let config = OrcaConfig::default();
        config.save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    // Load configuration
    let mut config = OrcaConfig::load(&args.config)?;

    // Apply CLI overrides
    if let Some(seed) = args.seed {
        config.identity.seed = Some(seed);
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(api_port) = args.api_port {
        config.api.port = api_port;
    }
    if let Some(relay) = args.relay {
        config.network.relay_addr = Some(relay);
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging.level, &config.logging.format);
    tracing::info!("OrcaNet Node v{}", env!("CARGO_PKG_VERSION"));

    let mut node = OrcaFullNode::new(config)?;
    if let Err(e) = node.start().await {
        node.shutdown().await?;
        return Err(e);
    }
    tracing::info!(peer_id = %node.peer_id(), api = ?node.api_addr(), "node ready");

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "node event loop error");
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("initiating graceful shutdown");
        }
    }

    node.shutdown().await?;
    tracing::info!("OrcaNet node exited cleanly");
    Ok(())
}
