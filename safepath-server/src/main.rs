mod api;
mod config;
mod error;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use safepath_core::{
    SafetyEngine,
    persist::{load_graph, load_incidents, load_infrastructure, load_shuttles},
    spatial::InfrastructureLayers,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{api::AppState, config::Config};

/// Safety-weighted routing server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML file with `[server]` and `[engine]` tables
    #[arg(long)]
    config: Option<PathBuf>,
    /// Street graph JSON document
    #[arg(long)]
    graph: PathBuf,
    /// JSON array of incident records published at startup
    #[arg(long)]
    incidents: Option<PathBuf>,
    /// JSON infrastructure layers (lamps, emergency points, patrols)
    #[arg(long)]
    infrastructure: Option<PathBuf>,
    /// JSON shuttle stops and line schedules
    #[arg(long)]
    shuttles: Option<PathBuf>,
    /// Overrides `server.listen`
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    let graph = load_graph(&cli.graph).context("loading graph")?;
    let layers = match &cli.infrastructure {
        Some(path) => load_infrastructure(path).context("loading infrastructure")?,
        None => InfrastructureLayers::default(),
    };
    let mut engine = SafetyEngine::with_infrastructure(graph, &layers, config.engine.clone())?;
    if let Some(path) = &cli.shuttles {
        engine = engine.with_shuttles(load_shuttles(path).context("loading shuttles")?)?;
    }

    if let Some(path) = &cli.incidents {
        let records = load_incidents(path).context("loading incidents")?;
        let summary = engine.refresh(records, Local::now().naive_local())?;
        info!(
            version = summary.version,
            attributed = summary.attributed,
            gaps = summary.unattributed,
            "Published startup incidents"
        );
    }

    let listen = config.server.listen;
    let state = Arc::new(AppState {
        engine,
        limits: config.server,
    });
    let app = api::router(state);

    info!("SafePath server listening on {listen}");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down");
}
