//! Disconnect, grace, and eviction handling.
//!
//! Disconnect marks the session resumable and arms a fixed grace timer;
//! only grace expiry without a resume removes the session and fires the
//! "disconnected" callback. This is what lets a client reconnect after a
//! page change without the application observing a spurious
//! disconnect/connect pair.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::close_code;

use super::ServerShared;
use crate::session::Session;

/// Window after disconnect during which a resume is still accepted.
/// Fixed by the protocol.
pub(crate) const RESUME_GRACE: Duration = Duration::from_secs(5);

impl ServerShared {
    /// Disconnect path for a session: close the transport, flip the
    /// connectivity flag, arm the grace timer.
    ///
    /// Idempotent, and a no-op when `epoch` is stale — a loop unwinding
    /// from a replaced transport cannot touch the fresh one.
    pub(crate) async fn handle_disconnect(
        &self,
        session: &Arc<Session>,
        epoch: u64,
        reason: Option<&str>,
    ) {
        if !session.mark_disconnected(epoch) {
            return;
        }
        session.close_transport(close_code::NORMAL, reason).await;
        tracing::info!(
            user_id = session.user_id(),
            epoch,
            reason = reason.unwrap_or(""),
            "session disconnected, grace window armed"
        );

        // The client might just be switching pages; hold the identity
        // until the grace window elapses.
        let Some(server) = self.self_ref.upgrade() else {
            return;
        };
        let session = Arc::clone(session);
        tokio::spawn(async move {
            tokio::time::sleep(RESUME_GRACE).await;
            server.evict_if_still_disconnected(&session, epoch).await;
        });
    }

    /// Grace-timer firing: checked against the live connectivity flag and
    /// epoch, so a resume in the window turns it into a no-op.
    async fn evict_if_still_disconnected(&self, session: &Arc<Session>, epoch: u64) {
        let evicted = {
            let mut map = self.sessions.write().await;
            if session.is_connected() || session.epoch() != epoch {
                return;
            }
            map.remove(&session.user_id())
        };
        if evicted.is_some() {
            session.terminate();
            tracing::info!(user_id = session.user_id(), "session evicted");
            self.disconnected.emit(Arc::clone(session));
        }
    }

    /// Graceful disconnect requested through [`Session::disconnect`].
    ///
    /// Ignores sessions no longer in the registry, and identity reuse: if
    /// the identity was evicted and re-created, the stale handle cannot
    /// disconnect the new session.
    pub(crate) async fn disconnect_session(&self, session: &Session, reason: Option<&str>) {
        let found = self
            .sessions
            .read()
            .await
            .get(&session.user_id())
            .map(Arc::clone);
        if let Some(found) = found
            && std::ptr::eq(Arc::as_ptr(&found), session)
        {
            let epoch = found.epoch();
            self.handle_disconnect(&found, epoch, reason).await;
        }
    }
}
