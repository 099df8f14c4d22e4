//! Error types
//!
//! Defines domain-specific error types for each module of the file-sharing
//! server. Protocol and storage failures are fatal to the session that caused
//! them and never to the event loop.

use std::fmt;
use std::io;

/// Wire protocol violations
#[derive(Debug)]
pub enum ProtocolError {
    HandshakeMismatch,
    UnknownCommand(u32),
    FieldTooLarge {
        field: &'static str,
        len: u64,
        max: u64,
    },
    EmptyField(&'static str),
    InvalidUtf8(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::HandshakeMismatch => write!(f, "Handshake string did not match"),
            ProtocolError::UnknownCommand(code) => write!(f, "Unknown command code: {}", code),
            ProtocolError::FieldTooLarge { field, len, max } => {
                write!(f, "Declared {} length {} exceeds maximum {}", field, len, max)
            }
            ProtocolError::EmptyField(field) => write!(f, "Declared {} length is zero", field),
            ProtocolError::InvalidUtf8(field) => write!(f, "Field {} is not valid UTF-8", field),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Storage module errors
#[derive(Debug)]
pub enum StorageError {
    FileNotFound(String),
    InvalidFileName(String),
    NoAvailableName(String),
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {}", name),
            StorageError::InvalidFileName(name) => write!(f, "Invalid file name: {}", name),
            StorageError::NoAvailableName(name) => {
                write!(f, "No collision-free name available for: {}", name)
            }
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        StorageError::Io(error)
    }
}

/// Session-level error covering everything that tears a connection down
#[derive(Debug)]
pub enum SessionError {
    Protocol(ProtocolError),
    Storage(StorageError),
    PeerDisconnect,
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Protocol(e) => write!(f, "Protocol error: {}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
            SessionError::PeerDisconnect => write!(f, "Peer closed the connection"),
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProtocolError> for SessionError {
    fn from(error: ProtocolError) -> Self {
        SessionError::Protocol(error)
    }
}

impl From<StorageError> for SessionError {
    fn from(error: StorageError) -> Self {
        SessionError::Storage(error)
    }
}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        SessionError::Io(error)
    }
}
