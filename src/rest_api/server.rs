//! Axum HTTP server for the REST API

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::store::ResourceStore;
use crate::{Error, Result};

use super::handlers;

/// State shared by every handler
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ResourceStore>,
    /// Namespace the operator watches, `None` for cluster-wide
    pub namespace: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/instances", get(handlers::list_instances))
        .route(
            "/api/v1/instances/{namespace}/{name}",
            get(handlers::get_instance),
        );

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(handlers::metrics));

    router
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the REST API server
pub async fn run_server(state: ApiState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("REST API server listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    Ok(())
}
