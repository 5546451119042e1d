//! Per-session receive loop.
//!
//! Drains exactly one attached transport at a time and survives transport
//! replacement: when the transport dies, the loop hands the session to the
//! disconnect path and blocks on the resume signal, continuing with the
//! new transport if the signal resolves as resumed.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::StreamExt;
use tokio::sync::oneshot;

use super::{ResumeSignal, Session, SocketStream};
use crate::error::SocketError;
use crate::events::{InboundEvent, emit_chains};
use crate::protocol::payloads::Dispatch;
use crate::protocol::{OpCode, SocketFrame};
use crate::server::ServerShared;

pub(crate) async fn receive_loop(
    server: Arc<ServerShared>,
    session: Arc<Session>,
    mut stream: SocketStream,
    mut resume_rx: oneshot::Receiver<ResumeSignal>,
    mut epoch: u64,
) {
    loop {
        drain(&server, &session, &mut stream, epoch).await;

        // The transport is unusable: remote close, transport error, or
        // superseded by a resume. Disconnect handling is epoch-guarded,
        // so a stale transport's death cannot touch a fresh one.
        server.handle_disconnect(&session, epoch, None).await;

        match resume_rx.await {
            Ok(ResumeSignal::Resumed(handoff)) => {
                stream = handoff.stream;
                epoch = handoff.epoch;
                resume_rx = handoff.next_resume;
                tracing::debug!(user_id = session.user_id(), epoch, "receive loop resumed");
            }
            Ok(ResumeSignal::Terminated) | Err(_) => {
                tracing::debug!(
                    user_id = session.user_id(),
                    error = %SocketError::SessionTerminated,
                    "receive loop exiting"
                );
                return;
            }
        }
    }
}

/// Reads frames until the transport dies or a frame fails to handle.
async fn drain(
    server: &Arc<ServerShared>,
    session: &Arc<Session>,
    stream: &mut SocketStream,
    epoch: u64,
) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(err) = handle_frame(server, session, text.as_str()) {
                    tracing::warn!(user_id = session.user_id(), epoch, %err, "inbound frame rejected");
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(user_id = session.user_id(), epoch, "transport closed");
                return;
            }
            // Binary, ping, and pong frames are not part of the protocol.
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::warn!(user_id = session.user_id(), epoch, %err, "transport read failed");
                return;
            }
        }
    }
}

fn handle_frame(
    server: &Arc<ServerShared>,
    session: &Arc<Session>,
    text: &str,
) -> Result<(), SocketError> {
    let frame = SocketFrame::decode(text)?;
    match frame.op {
        OpCode::Dispatch => {
            let dispatch: Dispatch = frame.payload_as()?;
            let event = InboundEvent {
                session: Arc::clone(session),
                event: dispatch.event,
                payload: dispatch.payload,
            };
            // Session-level listeners run before the server-level chain.
            emit_chains(
                vec![
                    session.event_listeners.snapshot(),
                    server.event_received.snapshot(),
                ],
                event,
            );
        }
        OpCode::HeartbeatAck => {
            if !session.ack_heartbeat() {
                tracing::debug!(user_id = session.user_id(), "stray heartbeat ack");
            }
        }
        other => {
            tracing::debug!(user_id = session.user_id(), op = u8::from(other), "opcode ignored");
        }
    }
    Ok(())
}
