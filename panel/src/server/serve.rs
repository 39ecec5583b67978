//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DockyardError;
use crate::server::handlers::{
    get_handler, health_handler, list_handler, remove_handler, restart_handler, start_handler,
    stop_handler, submit_handler, version_handler,
};
use crate::server::observer::observer_ws_handler;
use crate::server::state::ServerState;

/// Build the panel's router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deployments", post(submit_handler).get(list_handler))
        .route("/deployments/{id}", get(get_handler).delete(remove_handler))
        .route("/deployments/{id}/stop", post(stop_handler))
        .route("/deployments/{id}/start", post(start_handler))
        .route("/deployments/{id}/restart", post(restart_handler))
        // Live build output
        .route("/deployments/{id}/logs/ws", get(observer_ws_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server, returning the bound address and the server task
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<Result<(), DockyardError>>), DockyardError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DockyardError::ServerError(format!("failed to bind {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| DockyardError::ServerError(e.to_string()))?;
    info!("Starting HTTP server on {}", local_addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DockyardError::ServerError(e.to_string()))
    });

    Ok((local_addr, handle))
}
