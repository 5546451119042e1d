//! Wire protocol: the frame envelope, opcode table, and typed payloads.
//!
//! Every message on the socket is a single JSON text frame of the shape
//! `{"op": <integer>, "d": <payload or null>}`. The codec here is
//! stateless; narrowing the raw payload to a concrete type is done by the
//! caller based on the decoded opcode.

pub mod frame;
pub mod payloads;

pub use frame::{OpCode, SocketFrame};
pub use payloads::{Dispatch, Handshake, HandshakeResult};
