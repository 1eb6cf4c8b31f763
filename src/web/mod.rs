//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::EntityStore;
use crate::prtg::SyncService;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn EntityStore>,
    pub sync: Arc<SyncService>,
}

/// Web server for the PRTG sync service.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<dyn EntityStore>, sync: Arc<SyncService>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                sync,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // PRTG integration endpoints
            .route("/api/prtg/test-connection", post(handlers::handle_test_connection))
            .route("/api/prtg/config", put(handlers::handle_save_config))
            .route("/api/prtg/sync/{id}", get(handlers::handle_sync))
            .route("/api/prtg/charts/{scope}/{id}", get(handlers::handle_charts))
            // Sensor records
            .route("/api/sensors", post(handlers::handle_create_sensor))
            .route("/api/sensors/{id}", get(handlers::handle_get_sensor))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
