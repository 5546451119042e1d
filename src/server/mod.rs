//! Session registry and public server surface.
//!
//! [`SocketServer`] owns the set of live sessions, runs the handshake
//! protocol on every new transport, and fans out lifecycle callbacks.
//! The identity → session map is the only structure touched by more than
//! one task; every handshake and eviction goes through its single lock.

pub(crate) mod handshake;
pub(crate) mod registry;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use axum::Router;
use axum::routing::get;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, watch};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::SocketError;
use crate::events::{InboundEvent, Listeners};
use crate::session::Session;
use crate::ws::handler::ws_handler;

/// Authentication predicate: maps an opaque credential string to an
/// optional stable identity.
pub(crate) type AuthHandler = Arc<dyn Fn(String) -> BoxFuture<'static, Option<u64>> + Send + Sync>;

/// State shared by the axum handlers, the per-session loops, and the
/// public [`SocketServer`] handle.
pub(crate) struct ServerShared {
    pub(crate) self_ref: Weak<ServerShared>,
    pub(crate) config: ServerConfig,
    pub(crate) auth: AuthHandler,
    pub(crate) sessions: RwLock<HashMap<u64, Arc<Session>>>,
    pub(crate) connected: Listeners<Arc<Session>>,
    pub(crate) disconnected: Listeners<Arc<Session>>,
    pub(crate) resumed: Listeners<Arc<Session>>,
    pub(crate) event_received: Listeners<InboundEvent>,
    shutdown: watch::Sender<bool>,
}

/// WebSocket session server.
///
/// Cheap to clone; all clones share the same registry. Construct with an
/// authentication predicate and a [`ServerConfig`], register callbacks,
/// then either [`serve`](Self::serve) it or merge
/// [`router`](Self::router) into a larger axum application.
#[derive(Clone)]
pub struct SocketServer {
    shared: Arc<ServerShared>,
}

impl SocketServer {
    /// Creates a new server.
    ///
    /// The predicate is invoked with the credential string of every
    /// handshake; returning `None` rejects the client with an
    /// "unauthorized" close. Sync predicates wrap their result in an
    /// `async move` block.
    pub fn new<A, Fut>(auth: A, config: ServerConfig) -> Self
    where
        A: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<u64>> + Send + 'static,
    {
        let auth: AuthHandler = Arc::new(move |credential| Box::pin(auth(credential)));
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new_cyclic(|self_ref| ServerShared {
            self_ref: Weak::clone(self_ref),
            config,
            auth,
            sessions: RwLock::new(HashMap::new()),
            connected: Listeners::new(),
            disconnected: Listeners::new(),
            resumed: Listeners::new(),
            event_received: Listeners::new(),
            shutdown,
        });
        Self { shared }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Fired when a new client connects (fresh identity).
    pub fn on_connected<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shared.connected.subscribe(listener);
    }

    /// Fired when a session is evicted after its grace window elapses
    /// with no resume. A resumed session never fires this.
    pub fn on_disconnected<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shared.disconnected.subscribe(listener);
    }

    /// Fired when a client re-attaches a new transport to its existing
    /// session. No connected/disconnected pair fires for the transition.
    pub fn on_resumed<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shared.resumed.subscribe(listener);
    }

    /// Fired for every inbound dispatch event, after the session-level
    /// listeners for the same event.
    pub fn on_event<F, Fut>(&self, listener: F)
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shared.event_received.subscribe(listener);
    }

    /// Snapshots the currently live sessions.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.shared
            .sessions
            .read()
            .await
            .values()
            .map(Arc::clone)
            .collect()
    }

    /// Looks up a live session by identity.
    pub async fn session(&self, user_id: u64) -> Option<Arc<Session>> {
        self.shared.sessions.read().await.get(&user_id).map(Arc::clone)
    }

    /// Builds the axum router exposing the socket endpoint at the
    /// configured path.
    ///
    /// # Panics
    ///
    /// Panics if the configured path is not a valid axum route path
    /// (it must start with `/`).
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(self.shared.config.path.as_str(), get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Binds the configured address and serves until
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] if the listener cannot be bound or
    /// serving fails.
    pub async fn serve(&self) -> Result<(), SocketError> {
        let addr = self.shared.config.listen_addr();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, path = %self.shared.config.path, "session gateway listening");
        self.serve_on(listener).await
    }

    /// Serves on an already-bound listener until
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] if serving fails.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), SocketError> {
        let mut shutdown_rx = self.shared.shutdown.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await?;
        Ok(())
    }

    /// Tears the server down: stops accepting, closes every session's
    /// transport with a "server shutdown" reason, and empties the
    /// registry. Grace timers are not waited for; teardown is immediate.
    pub async fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
        let drained: Vec<Arc<Session>> = {
            let mut map = self.shared.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            session.shutdown_close().await;
        }
        tracing::info!(sessions = drained.len(), "server shut down");
    }

    pub(crate) fn shared(&self) -> &Arc<ServerShared> {
        &self.shared
    }
}

impl fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
