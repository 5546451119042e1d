//! # session-gateway
//!
//! Resumable-session WebSocket gateway: clients get stable logical
//! sessions that survive brief transport drops (e.g. page navigation)
//! via an explicit resume handshake, plus a heartbeat liveness protocol
//! and a named-event dispatch layer.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── Upgrade glue (ws/)
//!     │
//!     ├── SocketServer: handshake, resume-or-create, eviction (server/)
//!     │
//!     ├── Session: receive loop + heartbeat monitor (session/)
//!     ├── Listener chains (events)
//!     │
//!     └── Frame codec: {op, d} envelope (protocol/)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use session_gateway::config::ServerConfig;
//! use session_gateway::server::SocketServer;
//!
//! # async fn run() -> Result<(), session_gateway::error::SocketError> {
//! let server = SocketServer::new(
//!     |credential: String| async move { (!credential.is_empty()).then_some(42) },
//!     ServerConfig::default(),
//! );
//! server.on_connected(|session| async move {
//!     tracing::info!(user_id = session.user_id(), "client connected");
//! });
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod server;
pub mod session;
pub mod ws;

pub use config::ServerConfig;
pub use error::SocketError;
pub use events::{InboundEvent, Listeners};
pub use protocol::{Dispatch, Handshake, HandshakeResult, OpCode, SocketFrame};
pub use server::SocketServer;
pub use session::Session;
