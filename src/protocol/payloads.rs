//! Typed payloads for the opcodes that carry one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Client handshake payload, sent on first connect and on every resume
/// attempt. A resume re-sends a fresh handshake; the session's credential,
/// event set, and page label are overwritten wholesale from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Opaque credential string, mapped to a stable identity by the
    /// server's authentication predicate.
    pub auth: String,
    /// Event names the client declares interest in. Unique, order
    /// irrelevant; advisory metadata, not an inbound filter.
    #[serde(default)]
    pub events: HashSet<String>,
    /// Free-form client-supplied page label.
    #[serde(default)]
    pub page: String,
}

/// Server reply to a handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HandshakeResult {
    /// `true` when the handshake re-attached to an existing session.
    pub resumed: bool,
}

/// A named event with an arbitrary payload, used in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    /// Application-defined event name.
    pub event: String,
    /// Opaque structured payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn handshake_defaults_optional_fields() {
        let Ok(handshake) = serde_json::from_str::<Handshake>(r#"{"auth":"tok"}"#) else {
            panic!("auth alone must parse");
        };
        assert!(handshake.events.is_empty());
        assert!(handshake.page.is_empty());
    }

    #[test]
    fn handshake_deduplicates_events() {
        let Ok(handshake) =
            serde_json::from_str::<Handshake>(r#"{"auth":"tok","events":["chat","chat","game"]}"#)
        else {
            panic!("handshake must parse");
        };
        assert_eq!(handshake.events.len(), 2);
    }

    #[test]
    fn handshake_result_wire_shape() {
        let Ok(json) = serde_json::to_string(&HandshakeResult { resumed: true }) else {
            panic!("result must serialize");
        };
        assert_eq!(json, r#"{"resumed":true}"#);
    }

    #[test]
    fn dispatch_payload_defaults_to_null() {
        let Ok(dispatch) = serde_json::from_str::<Dispatch>(r#"{"event":"ping"}"#) else {
            panic!("dispatch must parse");
        };
        assert!(dispatch.payload.is_null());
    }
}
