//! Evidence pipeline binary entrypoint.
//! Loads configuration, registers sources, and runs the tick scheduler
//! until Ctrl-C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use evidence_pipeline::config::PipelineConfig;
use evidence_pipeline::ingest::config::load_sources_default;
use evidence_pipeline::ingest::providers::HttpFeedFetcher;
use evidence_pipeline::{build_pipeline, spawn_tick_scheduler, DynStore, MemoryStore};

/// Compact logs by default; `PIPELINE_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("evidence_pipeline=info,pipeline=info,warn"));

    let json = std::env::var("PIPELINE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_ADDR is not a socket address")?;
        evidence_pipeline::telemetry::install_with_listener(addr)?;
        tracing::info!(%addr, "prometheus listener started");
    }

    let config = PipelineConfig::load_default()?;
    let store: DynStore = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(HttpFeedFetcher::new(Duration::from_millis(
        config.fetch_timeout_ms,
    ))?);
    let pipeline = Arc::new(build_pipeline(store, fetcher, &config));

    let sources = load_sources_default()?;
    if sources.is_empty() {
        tracing::warn!("no sources configured; ticks will only re-score existing clusters");
    }
    for spec in sources {
        pipeline
            .ingestor()
            .register_source(&spec.name, spec.kind, &spec.address)
            .await?;
    }

    let handle = spawn_tick_scheduler(
        pipeline.clone(),
        Duration::from_secs(config.tick_interval_secs),
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    handle.abort();
    Ok(())
}
