//! Per-session heartbeat monitor.
//!
//! Proves liveness of the attached transport on a fixed cadence and
//! forces a disconnect on silence. Failure is never retried here; a
//! resume restarts the monitor under a fresh epoch and the stale one
//! stops itself.

use std::sync::Arc;
use std::time::Duration;

use super::Session;
use crate::protocol::{OpCode, SocketFrame};
use crate::server::ServerShared;

/// Deadline for acknowledging a probe. Fixed by the protocol.
pub(crate) const ACK_DEADLINE: Duration = Duration::from_secs(5);

pub(crate) async fn heartbeat_loop(server: Arc<ServerShared>, session: Arc<Session>, epoch: u64) {
    let interval = server.config.heartbeat_interval;
    loop {
        tokio::time::sleep(interval).await;
        if session.epoch() != epoch || !session.is_connected() {
            return;
        }

        let ack = session.arm_heartbeat();
        if let Err(err) = session
            .send_frame(&SocketFrame::empty(OpCode::Heartbeat))
            .await
        {
            tracing::warn!(user_id = session.user_id(), epoch, %err, "heartbeat probe failed");
            server
                .handle_disconnect(&session, epoch, Some("failed heartbeat"))
                .await;
            return;
        }

        match tokio::time::timeout(ACK_DEADLINE, ack).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                tracing::info!(user_id = session.user_id(), epoch, "heartbeat ack missed");
                server
                    .handle_disconnect(&session, epoch, Some("failed heartbeat"))
                    .await;
                return;
            }
        }
    }
}
