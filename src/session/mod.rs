//! Per-connection protocol state
//!
//! A `Session` tracks one client connection across many readiness events.
//! Each call to [`Session::advance`] performs at most one bounded socket read
//! or write, so no connection can hold the event loop hostage. State is a sum
//! type: every protocol phase carries only the fields that phase needs.

mod io;

pub use io::SessionIo;

use log::{debug, info, warn};
use std::io as stdio;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::Interest;

use crate::auth::HandshakeSecret;
use crate::config::ServerConfig;
use crate::error::{ProtocolError, SessionError, StorageError};
use crate::protocol::codec::{
    self, HandshakeReader, Request, RequestReader, WriteBuffer,
};
use crate::storage::{IncomingFile, OutgoingFile, list_files};

/// Bytes moved per advance() during file payload transfers.
const TRANSFER_CHUNK: usize = 8192;

/// Outcome of one advance() step.
#[derive(Debug)]
pub enum Advance {
    /// Keep the session registered with the given readiness interest.
    Continue(Interest),
    /// Session finished or failed; deregister and drop it.
    Closed,
}

/// Outbound file transfer: header first, then payload chunks refilled from
/// disk and drained to the socket.
struct FileSend {
    header: WriteBuffer,
    file: OutgoingFile,
    chunk: WriteBuffer,
    sent: u64,
    size: u64,
}

/// Inbound file transfer with a running received-byte offset.
struct FileReceive {
    file: IncomingFile,
    received: u64,
    size: u64,
}

enum SessionState {
    /// Server's handshake frame queued on accept, draining to the client.
    SendingHandshake(WriteBuffer),
    /// Reading the client's length-prefixed handshake string.
    AwaitingHandshake(HandshakeReader),
    /// Reading the next command code and its request fields.
    ReadyForCommand(RequestReader),
    /// Draining a prebuilt FILE_LIST_RESPONSE frame.
    ListingFiles(WriteBuffer),
    /// Draining a short INFORMATION frame.
    SendingInformation(WriteBuffer),
    /// Streaming a stored file to the client.
    SendingFile(FileSend),
    /// Streaming client bytes into the store.
    ReceivingFile(FileReceive),
    Closed,
}

pub struct Session<S> {
    io: S,
    peer: SocketAddr,
    state: SessionState,
    config: Arc<ServerConfig>,
    secret: Arc<HandshakeSecret>,
    scratch: Box<[u8]>,
}

impl<S: SessionIo> Session<S> {
    /// Creates the session for a freshly accepted connection with the
    /// server's handshake already queued for write.
    pub fn new(
        io: S,
        peer: SocketAddr,
        config: Arc<ServerConfig>,
        secret: Arc<HandshakeSecret>,
    ) -> Self {
        let handshake = codec::handshake_frame(secret.as_bytes());
        Self {
            io,
            peer,
            state: SessionState::SendingHandshake(WriteBuffer::new(handshake)),
            config,
            secret,
            scratch: vec![0u8; TRANSFER_CHUNK].into_boxed_slice(),
        }
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Readiness the event loop should wait for before the next advance().
    /// Writable interest exists only while outbound data is pending.
    pub fn interest(&self) -> Interest {
        match &self.state {
            SessionState::SendingHandshake(_)
            | SessionState::ListingFiles(_)
            | SessionState::SendingInformation(_)
            | SessionState::SendingFile(_) => Interest::WRITABLE,
            SessionState::AwaitingHandshake(_)
            | SessionState::ReadyForCommand(_)
            | SessionState::ReceivingFile(_)
            | SessionState::Closed => Interest::READABLE,
        }
    }

    /// Runs one bounded protocol step. Any session-fatal error tears the
    /// session down here; the caller only ever sees Continue or Closed.
    pub fn advance(&mut self) -> Advance {
        match self.step() {
            Ok(()) => match self.state {
                SessionState::Closed => Advance::Closed,
                _ => Advance::Continue(self.interest()),
            },
            Err(SessionError::PeerDisconnect) => {
                info!("Client {} closed the connection", self.peer);
                self.state = SessionState::Closed;
                Advance::Closed
            }
            Err(e) => {
                warn!("Session with {} terminated: {}", self.peer, e);
                self.state = SessionState::Closed;
                Advance::Closed
            }
        }
    }

    fn step(&mut self) -> Result<(), SessionError> {
        match &mut self.state {
            SessionState::SendingHandshake(out) => {
                write_some(&mut self.io, out)?;
                if out.is_drained() {
                    debug!("Handshake sent to {}", self.peer);
                    self.state = SessionState::AwaitingHandshake(HandshakeReader::new());
                }
                Ok(())
            }
            SessionState::AwaitingHandshake(reader) => {
                let Some(n) = read_some(&mut self.io, reader.writable())? else {
                    return Ok(());
                };
                if let Some(received) = reader.consume(n)? {
                    if !self.secret.matches(&received) {
                        // Fail closed: no response is owed to an
                        // unauthenticated peer.
                        return Err(ProtocolError::HandshakeMismatch.into());
                    }
                    debug!("Valid handshake from {}", self.peer);
                    self.state = SessionState::ReadyForCommand(RequestReader::new());
                }
                Ok(())
            }
            SessionState::ReadyForCommand(reader) => {
                let Some(n) = read_some(&mut self.io, reader.writable())? else {
                    return Ok(());
                };
                if let Some(request) = reader.consume(n)? {
                    self.begin_request(request)?;
                }
                Ok(())
            }
            SessionState::ListingFiles(out) | SessionState::SendingInformation(out) => {
                write_some(&mut self.io, out)?;
                if out.is_drained() {
                    self.state = SessionState::ReadyForCommand(RequestReader::new());
                }
                Ok(())
            }
            SessionState::SendingFile(send) => {
                if !send.header.is_drained() {
                    write_some(&mut self.io, &mut send.header)?;
                    return Ok(());
                }
                if send.chunk.is_drained() && send.sent < send.size {
                    let want = TRANSFER_CHUNK.min((send.size - send.sent) as usize);
                    let mut buf = vec![0u8; want];
                    let n = send.file.read_chunk(&mut buf)?;
                    if n == 0 {
                        return Err(SessionError::Io(stdio::Error::new(
                            stdio::ErrorKind::UnexpectedEof,
                            "file truncated during transfer",
                        )));
                    }
                    buf.truncate(n);
                    send.chunk = WriteBuffer::new(buf);
                }
                if !send.chunk.is_drained() {
                    let before = send.chunk.pending().len();
                    write_some(&mut self.io, &mut send.chunk)?;
                    send.sent += (before - send.chunk.pending().len()) as u64;
                }
                if send.sent == send.size && send.chunk.is_drained() {
                    info!(
                        "Completed download of {} bytes to {}",
                        send.size, self.peer
                    );
                    self.state = SessionState::ReadyForCommand(RequestReader::new());
                }
                Ok(())
            }
            SessionState::ReceivingFile(recv) => {
                let want = TRANSFER_CHUNK.min((recv.size - recv.received) as usize);
                let Some(n) = read_some(&mut self.io, &mut self.scratch[..want])? else {
                    return Ok(());
                };
                recv.file.write_chunk(&self.scratch[..n])?;
                recv.received += n as u64;
                if recv.received == recv.size {
                    let path = recv.file.commit()?;
                    info!("Upload from {} complete: {}", self.peer, path.display());
                    self.state = SessionState::ReadyForCommand(RequestReader::new());
                }
                Ok(())
            }
            SessionState::Closed => Ok(()),
        }
    }

    /// Transitions out of ReadyForCommand once a full request frame has been
    /// decoded.
    fn begin_request(&mut self, request: Request) -> Result<(), SessionError> {
        let root = self.config.server_root_path();
        match request {
            Request::ListFiles => {
                info!("Client {} requested the file list", self.peer);
                // Enumerated once per request; partial writes drain the same
                // buffer without touching the directory again.
                let text = list_files(&root)?;
                self.state =
                    SessionState::ListingFiles(WriteBuffer::new(codec::list_response_frame(&text)));
            }
            Request::Download { name } => {
                info!("Client {} requested download of {:?}", self.peer, name);
                match OutgoingFile::open(&root, &name) {
                    Ok(file) => {
                        let size = file.size();
                        let header = codec::download_header(&name, size);
                        self.state = SessionState::SendingFile(FileSend {
                            header: WriteBuffer::new(header),
                            file,
                            chunk: WriteBuffer::empty(),
                            sent: 0,
                            size,
                        });
                    }
                    Err(StorageError::FileNotFound(_)) => {
                        warn!("Client {} asked for missing file {:?}", self.peer, name);
                        let msg = format!("file \"{}\" does not exist", name);
                        self.state = SessionState::SendingInformation(WriteBuffer::new(
                            codec::information_frame(&msg),
                        ));
                    }
                    Err(StorageError::InvalidFileName(_)) => {
                        warn!("Client {} sent invalid file name {:?}", self.peer, name);
                        let msg = format!("file name {:?} is not allowed", name);
                        self.state = SessionState::SendingInformation(WriteBuffer::new(
                            codec::information_frame(&msg),
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Request::Upload { name, size } => {
                info!(
                    "Client {} uploading {:?} ({} bytes)",
                    self.peer, name, size
                );
                // Any storage failure here is fatal to the session: the
                // payload bytes are already on the wire and would
                // desynchronize the command stream.
                let mut file = IncomingFile::create(&root, &name)?;
                if size == 0 {
                    let path = file.commit()?;
                    info!("Stored empty file {}", path.display());
                    self.state = SessionState::ReadyForCommand(RequestReader::new());
                } else {
                    self.state = SessionState::ReceivingFile(FileReceive {
                        file,
                        received: 0,
                        size,
                    });
                }
            }
        }
        Ok(())
    }
}

/// One bounded write of whatever is pending. Zero bytes accepted for a
/// non-empty buffer means the peer is gone.
fn write_some<S: SessionIo>(io: &mut S, out: &mut WriteBuffer) -> Result<(), SessionError> {
    if out.is_drained() {
        return Ok(());
    }
    match io.try_write(out.pending()) {
        Ok(0) => Err(SessionError::PeerDisconnect),
        Ok(n) => {
            out.advance(n);
            Ok(())
        }
        Err(e)
            if e.kind() == stdio::ErrorKind::WouldBlock
                || e.kind() == stdio::ErrorKind::Interrupted =>
        {
            Ok(())
        }
        Err(e) => Err(SessionError::Io(e)),
    }
}

/// One bounded read. `None` means the socket was not actually ready.
fn read_some<S: SessionIo>(io: &mut S, buf: &mut [u8]) -> Result<Option<usize>, SessionError> {
    match io.try_read(buf) {
        Ok(0) => Err(SessionError::PeerDisconnect),
        Ok(n) => Ok(Some(n)),
        Err(e)
            if e.kind() == stdio::ErrorKind::WouldBlock
                || e.kind() == stdio::ErrorKind::Interrupted =>
        {
            Ok(None)
        }
        Err(e) => Err(SessionError::Io(e)),
    }
}
