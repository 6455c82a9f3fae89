//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::client::PumpTimings;
use crate::hub::HubHandle;

use super::{handler::websocket_handler, signal::shutdown_signal, state::AppState};

/// Build the router: the WebSocket endpoint plus the static web client.
///
/// Public so integration tests can serve it on an ephemeral port with
/// shrunk pump timings.
pub fn app(hub: HubHandle, timings: PumpTimings) -> Router {
    let state = Arc::new(AppState { hub, timings });

    Router::new()
        .route("/ws", get(websocket_handler))
        .fallback_service(ServeDir::new("public"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the chat relay server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `hub` - Handle to an already-running hub control loop
pub async fn run_server(
    host: String,
    port: u16,
    hub: HubHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = app(hub, PumpTimings::default());

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("chat relay listening on {}", listener.local_addr()?);
    tracing::info!("Connect to: ws://{}/ws?nickname=<name>", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
