//! session-gateway demo entry point.
//!
//! Serves the socket endpoint with a trivial authentication predicate
//! and logs every lifecycle callback.

use session_gateway::config::ServerConfig;
use session_gateway::server::SocketServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(port = config.port, path = %config.path, "starting session gateway");

    // Any non-empty credential maps to identity 1 in this demo.
    let server = SocketServer::new(
        |credential: String| async move { (!credential.is_empty()).then_some(1) },
        config,
    );

    server.on_connected(|session| async move {
        tracing::info!(user_id = session.user_id(), page = %session.page(), "client connected");
    });
    server.on_resumed(|session| async move {
        tracing::info!(user_id = session.user_id(), page = %session.page(), "client resumed");
    });
    server.on_disconnected(|session| async move {
        tracing::info!(user_id = session.user_id(), "client disconnected");
    });
    server.on_event(|event| async move {
        tracing::info!(
            user_id = event.session.user_id(),
            event = %event.event,
            "event received"
        );
    });

    server.serve().await?;
    Ok(())
}
