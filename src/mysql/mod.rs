//! MySQL wire-protocol support for the handshake probe.
//!
//! Only the slice of the protocol the probe needs: framing, the protocol-10
//! greeting, the native-password scramble, and response classification.
//! Nothing here issues queries.

pub mod client;
pub mod protocol;

pub use client::{MySqlConnection, MySqlError};
pub use protocol::{Greeting, ProtocolError, ServerResponse};
