//! Wire protocol
//!
//! Framing codec for the binary file-sharing protocol.

pub mod codec;

pub use codec::{HandshakeReader, Request, RequestReader, WriteBuffer};
