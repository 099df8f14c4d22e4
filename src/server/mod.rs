//! Server core
//!
//! Listener, session registry, and the single-threaded readiness loop.

mod core;

pub use core::Server;
