//! Transfer store
//!
//! Resolves destination paths under the server root, deduplicates filenames,
//! and streams bytes between sockets and storage.

pub mod operations;
pub mod validation;

pub use operations::{EMPTY_LIST_SENTINEL, INCOMING_DIR, IncomingFile, OutgoingFile, list_files};
pub use validation::sanitize_filename;
