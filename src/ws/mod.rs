//! Transport-accept glue: the axum upgrade endpoint.
//!
//! Everything below the upgrade — handshake, session lifecycle,
//! heartbeats — lives in the `server` and `session` modules; this layer
//! only turns accepted HTTP connections into sockets for them.

pub mod handler;
