//! Frame envelope and opcode table.

use serde::{Deserialize, Serialize};

use crate::error::SocketError;

/// Protocol opcodes, carried as a bare integer in the `op` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OpCode {
    /// Client → server: credential, event names, page label.
    Handshake,
    /// Server → client: whether the handshake resumed an existing session.
    HandshakeResult,
    /// Server → client liveness probe. No payload.
    Heartbeat,
    /// Client → server probe acknowledgement. No payload.
    HeartbeatAck,
    /// Either direction: named event with an arbitrary payload.
    Dispatch,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::Handshake => 0,
            OpCode::HandshakeResult => 1,
            OpCode::Heartbeat => 2,
            OpCode::HeartbeatAck => 3,
            OpCode::Dispatch => 4,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::HandshakeResult),
            2 => Ok(Self::Heartbeat),
            3 => Ok(Self::HeartbeatAck),
            4 => Ok(Self::Dispatch),
            other => Err(format!("unrecognized opcode {other}")),
        }
    }
}

/// Top-level wire envelope: opcode plus opcode-specific payload.
///
/// Immutable once constructed; exists only transiently for one send or
/// receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketFrame {
    /// Frame opcode.
    pub op: OpCode,
    /// Opcode-specific payload, absent for [`OpCode::Heartbeat`] and
    /// [`OpCode::HeartbeatAck`].
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SocketFrame {
    /// Builds a frame with no payload.
    #[must_use]
    pub const fn empty(op: OpCode) -> Self {
        Self { op, payload: None }
    }

    /// Builds a frame carrying `payload` serialized into the `d` field.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MalformedFrame`] if the payload cannot be
    /// represented as JSON.
    pub fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, SocketError> {
        Ok(Self {
            op,
            payload: Some(serde_json::to_value(payload)?),
        })
    }

    /// Serializes the envelope to a text message.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MalformedFrame`] if serialization fails.
    pub fn encode(&self) -> Result<String, SocketError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a text message into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MalformedFrame`] when the text is not valid
    /// JSON, the `op` field is absent, or the opcode is unrecognized.
    pub fn decode(text: &str) -> Result<Self, SocketError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Narrows the raw payload to a concrete payload type.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MalformedFrame`] if the payload is absent or
    /// does not match the expected shape.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, SocketError> {
        let value = self
            .payload
            .clone()
            .ok_or_else(|| SocketError::MalformedFrame("missing payload".to_string()))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::payloads::{Dispatch, Handshake};

    #[test]
    fn decode_handshake_scenario() {
        let Ok(frame) =
            SocketFrame::decode(r#"{"op":0,"d":{"auth":"tok1","events":["chat"],"page":"/lobby"}}"#)
        else {
            panic!("expected valid frame");
        };
        assert_eq!(frame.op, OpCode::Handshake);

        let Ok(handshake) = frame.payload_as::<Handshake>() else {
            panic!("expected handshake payload");
        };
        assert_eq!(handshake.auth, "tok1");
        assert!(handshake.events.contains("chat"));
        assert_eq!(handshake.page, "/lobby");
    }

    #[test]
    fn heartbeat_encodes_without_payload_field() {
        let Ok(json) = SocketFrame::empty(OpCode::Heartbeat).encode() else {
            panic!("heartbeat must encode");
        };
        assert_eq!(json, r#"{"op":2}"#);
    }

    #[test]
    fn decode_tolerates_null_payload() {
        let Ok(frame) = SocketFrame::decode(r#"{"op":3,"d":null}"#) else {
            panic!("expected valid frame");
        };
        assert_eq!(frame.op, OpCode::HeartbeatAck);
        assert!(frame.payload.is_none());
    }

    #[test]
    fn unrecognized_opcode_is_malformed() {
        let result = SocketFrame::decode(r#"{"op":9,"d":null}"#);
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn missing_opcode_is_malformed() {
        let result = SocketFrame::decode(r#"{"d":{"event":"x"}}"#);
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn non_json_is_malformed() {
        let result = SocketFrame::decode("not json");
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn payload_shape_mismatch_is_malformed() {
        let Ok(frame) = SocketFrame::decode(r#"{"op":4,"d":{"payload":{}}}"#) else {
            panic!("expected valid envelope");
        };
        // Dispatch requires an `event` field.
        let result = frame.payload_as::<Dispatch>();
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn missing_payload_narrows_to_malformed() {
        let frame = SocketFrame::empty(OpCode::Dispatch);
        let result = frame.payload_as::<Dispatch>();
        assert!(matches!(result, Err(SocketError::MalformedFrame(_))));
    }

    #[test]
    fn dispatch_round_trips_through_envelope() {
        let dispatch = Dispatch {
            event: "ping".to_string(),
            payload: serde_json::json!({"n": 1}),
        };
        let Ok(frame) = SocketFrame::with_payload(OpCode::Dispatch, &dispatch) else {
            panic!("dispatch must serialize");
        };
        let Ok(json) = frame.encode() else {
            panic!("frame must encode");
        };
        let Ok(decoded) = SocketFrame::decode(&json) else {
            panic!("frame must decode");
        };
        let Ok(out) = decoded.payload_as::<Dispatch>() else {
            panic!("payload must narrow");
        };
        assert_eq!(out.event, "ping");
        assert_eq!(out.payload, serde_json::json!({"n": 1}));
    }
}
