//! Penguin - video metadata tracker and blobber work queue
//!
//! Periodically refreshes the metadata of tracked videos, keeps an audit
//! history of every change and queues download work for blobber agents.

mod api;
mod app;
mod config;
mod db;
mod jobs;
mod refresh;
mod services;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::app::{AppState, build_app};
use crate::config::Config;
use crate::db::Database;
use crate::refresh::{RefreshCycle, RefreshEngine, RefreshStore};
use crate::services::{RateLimitConfig, YouTubeClient, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    tracing::info!("Starting Penguin");
    tracing::debug!(config = ?config, "Configuration loaded");

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    db.migrate().await?;
    tracing::info!("Database connected");

    let youtube = YouTubeClient::new(
        &config.youtube_api_url,
        &config.youtube_api_key,
        RateLimitConfig {
            requests_per_second: config.youtube_requests_per_second,
            burst_size: config.youtube_burst,
        },
    )?;

    let cancel = CancellationToken::new();
    let store: Arc<dyn RefreshStore> = Arc::new(db.clone());
    let engine = RefreshEngine::new(
        store.clone(),
        Arc::new(youtube),
        config.refresh_workers,
        cancel.clone(),
    );
    let cycle = RefreshCycle::new(store, engine);

    let mut scheduler = jobs::start_scheduler(cycle, &config.refresh_cron)
        .await
        .with_context(|| format!("Failed to schedule refresh with cron '{}'", config.refresh_cron))?;

    let app = build_app(AppState { db: db.clone() });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    cancel.cancel();
    scheduler.shutdown().await?;
    db.pool().close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
