//! Market feed server binary
//!
//! Wires configuration, the durable store, the shared state, and the
//! three background loops together, then serves the WebSocket endpoint
//! until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use market_feed::config::FeedConfig;
use market_feed::server::{
    self, run_aggregation_loop, run_cleanup_loop, run_generator_loop, FeedState,
};
use market_feed::store::{AggregateStore, HttpAggregateStore, MemoryAggregateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = FeedConfig::from_env();

    let store: Arc<dyn AggregateStore> = match &config.store_endpoint {
        Some(endpoint) => {
            info!(%endpoint, "using HTTP aggregate store");
            Arc::new(HttpAggregateStore::new(
                endpoint.clone(),
                config.store_timeout,
            )?)
        }
        None => {
            warn!("no store endpoint configured, aggregates stay in memory");
            Arc::new(MemoryAggregateStore::new())
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(FeedState::new(config, store, shutdown_rx.clone()));

    let generator = tokio::spawn(run_generator_loop(state.clone(), shutdown_rx.clone()));
    let aggregation = tokio::spawn(run_aggregation_loop(state.clone(), shutdown_rx.clone()));
    let cleanup = tokio::spawn(run_cleanup_loop(state.clone(), shutdown_rx));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        tickers = state.config.tickers.len(),
        version = market_feed::SERVICE_VERSION,
        "market feed listening"
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    // Let the periodic jobs observe the signal and finish their current
    // cycle, including an in-flight store write (bounded by the store
    // client timeout), before the process exits.
    for task in [generator, aggregation, cleanup] {
        let _ = task.await;
    }
    info!("shutdown complete");

    Ok(())
}
