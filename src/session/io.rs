//! Non-blocking socket access used by the session state machine.

use std::io;
use tokio::net::TcpStream;

/// Best-effort, return-immediately socket operations.
///
/// Every call may transfer zero, some, or all of the requested bytes. A
/// `WouldBlock` error means the socket was not actually ready; the session
/// keeps its state and waits for the next readiness event.
///
/// `tokio::net::TcpStream` provides these natively; tests substitute scripted
/// implementations to exercise partial reads and writes.
pub trait SessionIo {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl SessionIo for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}
