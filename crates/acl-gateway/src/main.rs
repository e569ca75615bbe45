//! ACL Gateway server binary.
//!
//! Loads the configuration and ACL table, serves until Ctrl+C, then drains.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acl_gateway::{EchoBusiness, GatewayConfig, GatewayServer};

/// RPC gateway with per-consumer ACLs, audit and usage statistics streams
#[derive(Parser, Debug)]
#[command(name = "acl-gateway")]
#[command(version, about)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// JSON ACL table (overrides `acl_path` from the configuration file)
    #[arg(short, long)]
    acl: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(acl) = args.acl {
        config.acl_path = Some(acl);
    }

    let acl_path = config
        .acl_path
        .clone()
        .context("No ACL table given (use --acl or acl_path)")?;
    let acl_json = std::fs::read_to_string(&acl_path)
        .with_context(|| format!("Failed to read ACL table {}", acl_path.display()))?;

    let server = GatewayServer::new(config, &acl_json, Arc::new(EchoBusiness::new()))
        .context("Failed to initialize gateway")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = server
        .start(shutdown_rx)
        .await
        .context("Failed to start gateway")?;

    info!(addr = %handle.local_addr(), "Gateway is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    handle.stopped().await.context("Gateway stopped with an error")?;

    Ok(())
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to install JSON log subscriber")
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to install log subscriber")
    }
}
