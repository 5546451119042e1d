//! Gateway error types with WebSocket close-code mapping.
//!
//! [`SocketError`] is the central error type for the gateway. Each variant
//! maps to the WebSocket close code and reason string sent to the peer
//! when the error tears down a transport.

use axum::extract::ws::close_code;

/// Server-side error enum with close-code mapping.
///
/// Transport- and protocol-level failures are handled locally (they end in
/// a disconnect or eviction transition) and never escape to the embedding
/// application except through the lifecycle callbacks and logging.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// A message could not be decoded, or its payload did not match the
    /// shape expected for its opcode.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No initial frame arrived within the handshake deadline.
    #[error("handshake timeout")]
    HandshakeTimeout,

    /// The first message was not text, or carried the wrong opcode.
    #[error("handshake protocol violation: {0}")]
    HandshakeProtocolViolation(String),

    /// The authentication predicate returned no identity.
    #[error("unauthorized")]
    Unauthorized,

    /// The heartbeat acknowledgement deadline elapsed.
    #[error("failed heartbeat")]
    HeartbeatTimeout,

    /// A read or write on an active socket failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The session was evicted while a loop was still waiting to resume.
    #[error("session terminated")]
    SessionTerminated,

    /// Listener socket could not be bound or served.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SocketError {
    /// Returns the WebSocket close code sent when this error closes a
    /// transport.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::MalformedFrame(_) | Self::HandshakeProtocolViolation(_) => close_code::PROTOCOL,
            Self::HandshakeTimeout
            | Self::Unauthorized
            | Self::HeartbeatTimeout
            | Self::TransportError(_)
            | Self::SessionTerminated
            | Self::Io(_) => close_code::NORMAL,
        }
    }

    /// Returns the close reason string sent alongside [`close_code`].
    ///
    /// [`close_code`]: Self::close_code
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "malformed frame",
            Self::HandshakeTimeout => "handshake timeout",
            Self::HandshakeProtocolViolation(_) => "expected handshake",
            Self::Unauthorized => "unauthorized",
            Self::HeartbeatTimeout => "failed heartbeat",
            Self::TransportError(_) => "transport error",
            Self::SessionTerminated => "session terminated",
            Self::Io(_) => "io error",
        }
    }
}

impl From<serde_json::Error> for SocketError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

impl From<axum::Error> for SocketError {
    fn from(err: axum::Error) -> Self {
        Self::TransportError(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_protocol_close() {
        assert_eq!(
            SocketError::MalformedFrame("bad".to_string()).close_code(),
            close_code::PROTOCOL
        );
        assert_eq!(
            SocketError::HandshakeProtocolViolation("first frame".to_string()).close_code(),
            close_code::PROTOCOL
        );
    }

    #[test]
    fn lifecycle_errors_map_to_normal_close() {
        assert_eq!(SocketError::HandshakeTimeout.close_code(), close_code::NORMAL);
        assert_eq!(SocketError::Unauthorized.close_code(), close_code::NORMAL);
        assert_eq!(SocketError::HeartbeatTimeout.close_code(), close_code::NORMAL);
    }

    #[test]
    fn heartbeat_timeout_reason_is_stable() {
        assert_eq!(SocketError::HeartbeatTimeout.close_reason(), "failed heartbeat");
    }
}
