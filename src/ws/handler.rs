//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use crate::server::SocketServer;

/// Upgrades an HTTP connection at the configured socket path and hands
/// the socket to the handshake protocol.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(server): State<SocketServer>,
) -> impl IntoResponse {
    let shared = Arc::clone(server.shared());
    ws.on_upgrade(move |socket| async move { shared.handle_connection(socket).await })
}
