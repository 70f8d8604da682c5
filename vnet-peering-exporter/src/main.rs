//! VNet peering exporter entry point
//!
//! Startup order: `.env`, logging, config validation, ARM client, metrics,
//! HTTP server, then the poll loop. Anything that fails before the poll loop
//! starts is fatal.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vnet_peering_exporter::http::LISTEN_ADDR;
use vnet_peering_exporter::{Exporter, ExporterConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // no .env is fine
    init_tracing();

    if let Err(e) = run().await {
        error!("Error running exporter: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vnet_peering_exporter=info,tower_http=info")),
        )
        .init();
}

async fn run() -> Result<()> {
    let config = ExporterConfig::parse();
    let exporter = Exporter::from_config(&config)?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(LISTEN_ADDR)
        .await
        .with_context(|| format!("binding {LISTEN_ADDR}"))?;
    exporter
        .run(listener, shutdown)
        .await
        .context("exporter stopped")?;

    info!("exporter stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!("cannot listen for shutdown signal: {e}"),
        }
    });
}
