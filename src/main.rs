//! LuaRocks Mirror Daemon - caching mirror for a LuaRocks repository
//!
//! Serves rocks and rockspecs from a local cache. Missing or outdated files
//! are downloaded in the background while clients are redirected to the
//! origin, so no request ever waits on a download.

mod cache;
mod config;
mod mirror;
mod origin;
mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{Args, MirrorConfig};
use mirror::Mirror;
use server::MirrorServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match MirrorConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting luarocks-mirror");
    info!(
        origin = %config.origin,
        data_dir = %config.data_dir.display(),
        timeout_secs = config.probe_timeout.as_secs(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        "Mirror configuration"
    );

    let mirror = Arc::new(Mirror::new(&config)?);

    let mut server = MirrorServer::new(mirror);
    if let Err(e) = server.start(config.listen_address).await {
        error!(error = %e, "Error starting HTTP server");
        return Err(e);
    }

    server.run(shutdown_signal()).await?;

    info!("Shutdown complete.");
    Ok(())
}

/// Resolve on Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, stopping..."),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
