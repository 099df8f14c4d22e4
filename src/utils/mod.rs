//! Utilities
//!
//! Helpers outside the protocol path.

pub mod network;

pub use network::print_connection_guide;
