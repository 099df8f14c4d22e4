//! ByteShare Server
//!
//! A single-process file-sharing server. One readiness-driven event loop
//! drives every client connection through a framed binary protocol:
//! passphrase handshake, file upload, file download, and directory listing.

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod utils;

pub use server::Server;
