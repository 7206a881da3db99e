//! trends-harvester - trend harvesting HTTP service
//!
//! Serves cached, category-tagged trend datasets per geography. Each harvest
//! fans out one retrieval per category over a bounded worker pool.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use trends_common::config::HarvesterConfig;

use trends_harvester::services::CommandAgent;
use trends_harvester::AppState;

/// Command-line arguments for trends-harvester
#[derive(Parser, Debug)]
#[command(name = "trends-harvester")]
#[command(about = "Trend harvesting HTTP service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TRENDS_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = HarvesterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    trends_harvester::logging::init_tracing(&config.logging)?;

    info!("Starting trends-harvester v{}", env!("CARGO_PKG_VERSION"));
    info!(
        download_dir = %config.retrieval.download_dir.display(),
        cache_ttl_secs = config.cache.ttl_secs,
        max_workers = config.workers.max,
        "Configuration loaded"
    );

    let agent = CommandAgent::from_config(&config.agent);
    if agent.locate().is_none() {
        warn!("Retrieval agent program not found; harvests will report failures until it is configured");
    }

    tokio::fs::create_dir_all(&config.retrieval.download_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.retrieval.download_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    let state = AppState::from_config(config, Arc::new(agent)).context("Failed to build harvest pipeline")?;
    let app = trends_harvester::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
