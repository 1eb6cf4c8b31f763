//! PRTG sensor sync service.
//!
//! Pulls sensor state from a PRTG Network Monitor instance into local
//! records and proxies its chart images as embedded data URIs.

mod config;
mod db;
mod error;
mod prtg;
mod web;

use config::ServerConfig;
use db::{EntityStore, SqliteStore};
use prtg::SyncService;
use web::Server;

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("prtg_sync=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting PRTG sync service on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    if store.find_active_config()?.is_none() {
        tracing::info!("No active PRTG configuration; set one via PUT /api/prtg/config");
    }

    // Create the sync orchestrator
    let sync = Arc::new(SyncService::new(
        store.clone(),
        PathBuf::from(&cfg.chart_log_path),
    ));

    // Start web server
    let server = Server::new(cfg, store, sync);
    server.start().await?;

    Ok(())
}
