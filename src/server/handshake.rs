//! Handshake protocol for newly accepted transports.
//!
//! States: awaiting handshake → authenticating → resumed or created →
//! active. The resume-or-create decision and the attach both happen under
//! the registry map's write guard, so two handshakes racing for the same
//! identity serialize: exactly one create wins and the second observes
//! the created session and takes the resume path.

use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;

use super::ServerShared;
use crate::error::SocketError;
use crate::protocol::payloads::{Handshake, HandshakeResult};
use crate::protocol::{OpCode, SocketFrame};
use crate::session::heartbeat::heartbeat_loop;
use crate::session::receive::receive_loop;
use crate::session::{ResumeHandoff, ResumeSignal, Session, SocketSink, SocketStream};

/// How long a new transport may sit silent before its first frame.
pub(crate) const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(5);

impl ServerShared {
    /// Runs the one-shot handshake protocol on a freshly upgraded socket.
    pub(crate) async fn handle_connection(&self, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();

        let first = match tokio::time::timeout(HANDSHAKE_DEADLINE, stream.next()).await {
            Ok(msg) => msg,
            Err(_) => {
                reject(&mut sink, &SocketError::HandshakeTimeout).await;
                return;
            }
        };

        let text = match first {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(_)) => {
                reject(
                    &mut sink,
                    &SocketError::HandshakeProtocolViolation(
                        "first message must be text".to_string(),
                    ),
                )
                .await;
                return;
            }
            Some(Err(err)) => {
                tracing::debug!(%err, "socket failed before handshake");
                return;
            }
            None => {
                tracing::debug!("socket closed before handshake");
                return;
            }
        };

        let handshake = match decode_handshake(text.as_str()) {
            Ok(handshake) => handshake,
            Err(err) => {
                tracing::warn!(%err, "handshake rejected");
                reject(&mut sink, &err).await;
                return;
            }
        };

        let Some(user_id) = (self.auth)(handshake.auth.clone()).await else {
            reject(&mut sink, &SocketError::Unauthorized).await;
            return;
        };

        self.resume_or_create(user_id, handshake, sink, stream).await;
    }

    /// Attaches the transport to an existing session or creates a new
    /// one, holding the map's write guard across the whole attach.
    async fn resume_or_create(
        &self,
        user_id: u64,
        handshake: Handshake,
        sink: SocketSink,
        stream: SocketStream,
    ) {
        let Some(server) = self.self_ref.upgrade() else {
            return;
        };

        let mut map = self.sessions.write().await;
        if let Some(session) = map.get(&user_id).map(Arc::clone) {
            self.resume_attach(&server, &session, &handshake, sink, stream)
                .await;
            drop(map);
            tracing::info!(user_id, page = %session.page(), "session resumed");
            self.resumed.emit(session);
        } else {
            let (resume_tx, resume_rx) = oneshot::channel();
            let session = Arc::new(Session::new(
                user_id,
                &handshake,
                sink,
                resume_tx,
                Weak::clone(&self.self_ref),
            ));
            map.insert(user_id, Arc::clone(&session));

            tokio::spawn(receive_loop(
                Arc::clone(&server),
                Arc::clone(&session),
                stream,
                resume_rx,
                0,
            ));
            tokio::spawn(heartbeat_loop(Arc::clone(&server), Arc::clone(&session), 0));

            send_result(&session, false).await;
            drop(map);
            tracing::info!(user_id, page = %session.page(), "session created");
            self.connected.emit(session);
        }
    }

    /// Swaps the session onto the new transport: epoch advance, field
    /// overwrite, old-transport retirement, resume-signal fulfillment,
    /// and a fresh heartbeat monitor.
    async fn resume_attach(
        &self,
        server: &Arc<ServerShared>,
        session: &Arc<Session>,
        handshake: &Handshake,
        sink: SocketSink,
        stream: SocketStream,
    ) {
        // Advancing the epoch first makes every in-flight disconnect or
        // grace firing for the old transport stale.
        let epoch = session.go_live(handshake);
        session
            .close_transport(axum::extract::ws::close_code::NORMAL, Some("resumed"))
            .await;
        session.install_sink(sink).await;

        let (next_tx, next_rx) = oneshot::channel();
        let handoff = ResumeSignal::Resumed(Box::new(ResumeHandoff {
            stream,
            epoch,
            next_resume: next_rx,
        }));
        match session.swap_resume_sender(next_tx) {
            Some(prev) => {
                if prev.send(handoff).is_err() {
                    tracing::warn!(user_id = session.user_id(), "resume signal had no waiter");
                }
            }
            None => {
                tracing::warn!(user_id = session.user_id(), "resume signal missing");
            }
        }

        tokio::spawn(heartbeat_loop(
            Arc::clone(server),
            Arc::clone(session),
            epoch,
        ));

        send_result(session, true).await;
    }
}

fn decode_handshake(text: &str) -> Result<Handshake, SocketError> {
    let frame = SocketFrame::decode(text)?;
    if frame.op != OpCode::Handshake {
        return Err(SocketError::HandshakeProtocolViolation(format!(
            "expected handshake, got opcode {}",
            u8::from(frame.op)
        )));
    }
    frame.payload_as()
}

async fn send_result(session: &Arc<Session>, resumed: bool) {
    let frame = SocketFrame::with_payload(OpCode::HandshakeResult, &HandshakeResult { resumed });
    match frame {
        Ok(frame) => {
            if let Err(err) = session.send_frame(&frame).await {
                tracing::warn!(user_id = session.user_id(), %err, "handshake result not sent");
            }
        }
        Err(err) => tracing::warn!(%err, "handshake result did not serialize"),
    }
}

/// Closes a transport that never became a session.
async fn reject(sink: &mut SocketSink, err: &SocketError) {
    let frame = CloseFrame {
        code: err.close_code(),
        reason: Utf8Bytes::from(err.close_reason()),
    };
    if let Err(send_err) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(%send_err, "close frame not delivered");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn wrong_first_opcode_is_a_protocol_violation() {
        let result = decode_handshake(r#"{"op":4,"d":{"event":"x"}}"#);
        assert!(matches!(
            result,
            Err(SocketError::HandshakeProtocolViolation(_))
        ));
    }

    #[test]
    fn undecodable_first_frame_is_malformed() {
        let result = decode_handshake("nonsense");
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn handshake_payload_shape_is_enforced() {
        let result = decode_handshake(r#"{"op":0,"d":{"events":[]}}"#);
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn valid_handshake_decodes() {
        let Ok(handshake) =
            decode_handshake(r#"{"op":0,"d":{"auth":"tok1","events":["chat"],"page":"/lobby"}}"#)
        else {
            panic!("expected valid handshake");
        };
        assert_eq!(handshake.auth, "tok1");
        assert_eq!(handshake.page, "/lobby");
    }
}
