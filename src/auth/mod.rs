//! Handshake authentication
//!
//! The server and its clients share one static passphrase. Both sides send
//! the same composed handshake string right after connect, and the server
//! accepts a client only on a byte-for-byte match. There is no user database
//! and no per-user state.

/// Fixed prefix combined with the operator's passphrase to form the
/// handshake string. Both ends must use the same composition.
pub const HANDSHAKE_PREFIX: &str = "ByteShareHandShake";

/// The composed handshake secret.
#[derive(Debug, Clone)]
pub struct HandshakeSecret {
    bytes: Vec<u8>,
}

impl HandshakeSecret {
    /// Composes the secret from the operator-supplied passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut composed = String::with_capacity(HANDSHAKE_PREFIX.len() + passphrase.len());
        composed.push_str(HANDSHAKE_PREFIX);
        composed.push_str(passphrase);
        Self {
            bytes: composed.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte-for-byte comparison against what the client sent.
    pub fn matches(&self, received: &[u8]) -> bool {
        self.bytes == received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_prefix_plus_passphrase() {
        let secret = HandshakeSecret::from_passphrase("hunter2");
        assert_eq!(secret.as_bytes(), b"ByteShareHandShakehunter2");
    }

    #[test]
    fn matches_requires_exact_bytes() {
        let secret = HandshakeSecret::from_passphrase("pw");
        assert!(secret.matches(b"ByteShareHandShakepw"));
        assert!(!secret.matches(b"ByteShareHandShakePW"));
        assert!(!secret.matches(b"ByteShareHandShakepw "));
        assert!(!secret.matches(b""));
    }
}
