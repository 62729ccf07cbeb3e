//! Webhook delivery service binary.
//!
//! Starts the HTTP API and the background retry worker, and shuts both down
//! gracefully on SIGINT.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assettrack_webhooks::config::AppConfig;
use assettrack_webhooks::rate_limit::PRUNE_INTERVAL;
use assettrack_webhooks::{api_router, AppState, DeliveryWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let worker_settings = config.worker.clone();
    let listen_addr = config.listen_addr;

    let state = AppState::new(pool, config)?;

    let prune_task = Arc::clone(&state.rate_limiter).spawn_prune_task(PRUNE_INTERVAL);

    let worker = Arc::new(DeliveryWorker::new(
        (*state.delivery_service).clone(),
        worker_settings,
    ));
    let worker_handle = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    let app = api_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;

    info!(addr = %listen_addr, "Webhook service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped, shutting down worker");
    prune_task.abort();
    worker.shutdown();
    worker_handle.await.context("Worker task panicked")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
