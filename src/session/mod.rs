//! Session layer: the logical-client entity and its per-session loops.
//!
//! A [`Session`] represents one authenticated logical client across
//! possibly many physical transport attachments. Its receive loop and
//! heartbeat monitor run as independent tasks; transport replacement on
//! resume is handed to the receive loop through a one-shot signal so it
//! never observes a half-swapped transport.

pub(crate) mod heartbeat;
pub(crate) mod receive;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex as StdMutex, PoisonError, RwLock, Weak};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use chrono::{DateTime, Utc};
use futures_util::SinkExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::sync::{Mutex, oneshot};

use crate::error::SocketError;
use crate::events::{InboundEvent, Listeners};
use crate::protocol::payloads::{Dispatch, Handshake};
use crate::protocol::{OpCode, SocketFrame};
use crate::server::ServerShared;

/// Write half of an attached transport.
pub(crate) type SocketSink = SplitSink<WebSocket, Message>;
/// Read half of an attached transport.
pub(crate) type SocketStream = SplitStream<WebSocket>;

/// Outcome delivered to a receive loop blocked on a dead transport.
pub(crate) enum ResumeSignal {
    /// A new transport attached; continue with the enclosed handoff.
    Resumed(Box<ResumeHandoff>),
    /// The session was evicted; the loop is permanently done.
    Terminated,
}

/// Everything a receive loop needs to continue after a resume: the new
/// read half, the epoch it was attached under, and the receiver for the
/// next cycle's resume signal.
pub(crate) struct ResumeHandoff {
    pub(crate) stream: SocketStream,
    pub(crate) epoch: u64,
    pub(crate) next_resume: oneshot::Receiver<ResumeSignal>,
}

/// Handshake-supplied state, overwritten wholesale on every successful
/// handshake or resume, plus the connectivity flag and epoch.
struct Profile {
    auth: String,
    events: HashSet<String>,
    page: String,
    connected: bool,
    epoch: u64,
    last_resumed_at: Option<DateTime<Utc>>,
}

/// One authenticated logical client.
///
/// Created on the first successful handshake for an identity, mutated on
/// resume (transport swap, field overwrite, signal fulfillment), and
/// removed from the registry only after the disconnect grace window
/// elapses with no resume. The identity never changes after creation.
pub struct Session {
    user_id: u64,
    connected_at: DateTime<Utc>,
    profile: RwLock<Profile>,
    sink: Mutex<Option<SocketSink>>,
    resume_tx: StdMutex<Option<oneshot::Sender<ResumeSignal>>>,
    heartbeat_tx: StdMutex<Option<oneshot::Sender<()>>>,
    pub(crate) event_listeners: Listeners<InboundEvent>,
    server: Weak<ServerShared>,
}

impl Session {
    pub(crate) fn new(
        user_id: u64,
        handshake: &Handshake,
        sink: SocketSink,
        resume_tx: oneshot::Sender<ResumeSignal>,
        server: Weak<ServerShared>,
    ) -> Self {
        Self {
            user_id,
            connected_at: Utc::now(),
            profile: RwLock::new(Profile {
                auth: handshake.auth.clone(),
                events: handshake.events.clone(),
                page: handshake.page.clone(),
                connected: true,
                epoch: 0,
                last_resumed_at: None,
            }),
            sink: Mutex::new(Some(sink)),
            resume_tx: StdMutex::new(Some(resume_tx)),
            heartbeat_tx: StdMutex::new(None),
            event_listeners: Listeners::new(),
            server,
        }
    }

    /// Stable identity returned by the authentication predicate. This is
    /// the resume key; it never changes after creation.
    #[must_use]
    pub const fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Credential string from the most recent handshake.
    #[must_use]
    pub fn authentication(&self) -> String {
        self.read_profile().auth.clone()
    }

    /// Page label from the most recent handshake.
    #[must_use]
    pub fn page(&self) -> String {
        self.read_profile().page.clone()
    }

    /// Event names from the most recent handshake. Advisory metadata for
    /// outbound dispatch; inbound events are never filtered against it.
    #[must_use]
    pub fn events(&self) -> HashSet<String> {
        self.read_profile().events.clone()
    }

    /// Whether a live transport is currently attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.read_profile().connected
    }

    /// When the session was first created.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// When the session last resumed, if it ever has.
    #[must_use]
    pub fn last_resumed_at(&self) -> Option<DateTime<Utc>> {
        self.read_profile().last_resumed_at
    }

    /// Registers a session-level listener for inbound dispatch events.
    ///
    /// Session-level listeners run before the server-level chain for the
    /// same event.
    pub fn on_event<F, Fut>(&self, listener: F)
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.event_listeners.subscribe(listener);
    }

    /// Sends a named event with an arbitrary payload to this client.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MalformedFrame`] if the payload cannot be
    /// serialized, or [`SocketError::TransportError`] if no transport is
    /// attached or the write fails.
    pub async fn dispatch<T: serde::Serialize>(
        &self,
        event: &str,
        payload: &T,
    ) -> Result<(), SocketError> {
        let dispatch = Dispatch {
            event: event.to_string(),
            payload: serde_json::to_value(payload)?,
        };
        let frame = SocketFrame::with_payload(OpCode::Dispatch, &dispatch)?;
        self.send_frame(&frame).await
    }

    /// Gracefully disconnects this session with an optional reason.
    ///
    /// The session stays eligible for resume until the grace window
    /// elapses, exactly as for a remote-initiated close.
    pub async fn disconnect(&self, reason: Option<&str>) {
        if let Some(server) = self.server.upgrade() {
            server.disconnect_session(self, reason).await;
        } else {
            self.close_transport(close_code::NORMAL, reason).await;
        }
    }

    /// Serializes and writes one frame to the attached transport.
    pub(crate) async fn send_frame(&self, frame: &SocketFrame) -> Result<(), SocketError> {
        let text = frame.encode()?;
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| SocketError::TransportError("no transport attached".to_string()))?;
        sink.send(Message::text(text)).await?;
        Ok(())
    }

    /// Current go-live epoch. Incremented on every resume; loops and
    /// timers started under an older epoch treat themselves as stale.
    pub(crate) fn epoch(&self) -> u64 {
        self.read_profile().epoch
    }

    /// Overwrites the handshake-supplied state, marks the session
    /// connected, and advances the epoch. Returns the new epoch.
    pub(crate) fn go_live(&self, handshake: &Handshake) -> u64 {
        // A probe armed under the old transport must not be acked by the
        // new one.
        self.heartbeat_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut profile = self.write_profile();
        profile.auth = handshake.auth.clone();
        profile.events = handshake.events.clone();
        profile.page = handshake.page.clone();
        profile.connected = true;
        profile.epoch += 1;
        profile.last_resumed_at = Some(Utc::now());
        profile.epoch
    }

    /// Attaches a new write half.
    pub(crate) async fn install_sink(&self, sink: SocketSink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Flips the connectivity flag off, if the caller's epoch is still
    /// current and the session is still connected. Returns whether the
    /// caller owns the disconnect transition.
    pub(crate) fn mark_disconnected(&self, epoch: u64) -> bool {
        let mut profile = self.write_profile();
        if profile.epoch != epoch || !profile.connected {
            return false;
        }
        profile.connected = false;
        true
    }

    /// Closes and detaches the current transport. Idempotent: closing an
    /// already-closed transport does nothing.
    pub(crate) async fn close_transport(&self, code: u16, reason: Option<&str>) {
        let taken = self.sink.lock().await.take();
        if let Some(mut sink) = taken {
            let frame = CloseFrame {
                code,
                reason: Utf8Bytes::from(reason.unwrap_or_default().to_string()),
            };
            if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                tracing::debug!(user_id = self.user_id, %err, "close frame not delivered");
            }
        }
    }

    /// Installs the sender for the next resume cycle, returning the
    /// previous one so the caller can fulfill it.
    pub(crate) fn swap_resume_sender(
        &self,
        next: oneshot::Sender<ResumeSignal>,
    ) -> Option<oneshot::Sender<ResumeSignal>> {
        self.resume_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next)
    }

    /// Immediate teardown for server disposal: closes the transport with
    /// a "server shutdown" reason and denies any pending resume. Does not
    /// wait for the grace window.
    pub(crate) async fn shutdown_close(&self) {
        self.write_profile().connected = false;
        self.close_transport(close_code::NORMAL, Some("server shutdown"))
            .await;
        self.terminate();
    }

    /// Denies any pending resume, releasing a receive loop still blocked
    /// on the signal.
    pub(crate) fn terminate(&self) {
        let taken = self
            .resume_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = taken {
            let _ = tx.send(ResumeSignal::Terminated);
        }
    }

    /// Installs a fresh heartbeat-ack signal for one probe cycle.
    pub(crate) fn arm_heartbeat(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.heartbeat_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        rx
    }

    /// Fulfills the current heartbeat-ack signal. Returns `false` when no
    /// probe cycle is armed.
    pub(crate) fn ack_heartbeat(&self) -> bool {
        let taken = self
            .heartbeat_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    fn read_profile(&self) -> std::sync::RwLockReadGuard<'_, Profile> {
        self.profile.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_profile(&self) -> std::sync::RwLockWriteGuard<'_, Profile> {
        self.profile.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profile = self.read_profile();
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("connected", &profile.connected)
            .field("epoch", &profile.epoch)
            .field("page", &profile.page)
            .finish_non_exhaustive()
    }
}
