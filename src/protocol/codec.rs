//! Framing codec
//!
//! Translates between the wire byte stream and typed frame fields. Everything
//! here is pure: incremental readers are filled from byte slices handed to
//! them by the session, and encoders produce complete header byte vectors.
//! No socket or file I/O happens in this module.
//!
//! All integers on the wire are big-endian (network byte order). Filenames
//! and informational text are UTF-8. Every variable-length field is preceded
//! by its length, and each declared length is checked against a hard maximum
//! before any buffer is allocated for it.

use crate::error::ProtocolError;

/// Client asks the server to send it a named file.
pub const FILE_SEND_REQUEST: u32 = 1;
/// Client pushes a named file of known size to the server.
pub const FILE_UPLOAD_REQUEST: u32 = 2;
/// Server response carrying a file payload.
pub const FILE_DOWNLOAD: u32 = 3;
/// Client asks for the names of the stored files.
pub const FILE_LIST_REQUEST: u32 = 4;
/// Server response carrying the listing text.
pub const FILE_LIST_RESPONSE: u32 = 5;
/// Short textual status or error reply.
pub const INFORMATION: u32 = 6;

/// Upper bound on a client-declared handshake length.
pub const MAX_HANDSHAKE_LENGTH: u32 = 256;
/// Upper bound on a client-declared file name length.
pub const MAX_FILE_NAME_LENGTH: u32 = 512;
/// Upper bound on a client-declared file size.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// A request frame fully decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListFiles,
    Download { name: String },
    Upload { name: String, size: u64 },
}

pub fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// `len:u32 | secret` — sent by the server immediately after accept, and
/// expected from the client before any command.
pub fn handshake_frame(secret: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + secret.len());
    put_u32(&mut buf, secret.len() as u32);
    buf.extend_from_slice(secret);
    buf
}

/// `FILE_LIST_RESPONSE | len:u32 | text`
pub fn list_response_frame(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + text.len());
    put_u32(&mut buf, FILE_LIST_RESPONSE);
    put_u32(&mut buf, text.len() as u32);
    buf.extend_from_slice(text.as_bytes());
    buf
}

/// `INFORMATION | len:u32 | msg`
pub fn information_frame(msg: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + msg.len());
    put_u32(&mut buf, INFORMATION);
    put_u32(&mut buf, msg.len() as u32);
    buf.extend_from_slice(msg.as_bytes());
    buf
}

/// `FILE_DOWNLOAD | nameLen:u32 | name | size:u64` — the file bytes stream
/// right behind this header.
pub fn download_header(name: &str, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + name.len());
    put_u32(&mut buf, FILE_DOWNLOAD);
    put_u32(&mut buf, name.len() as u32);
    buf.extend_from_slice(name.as_bytes());
    put_u64(&mut buf, size);
    buf
}

/// One fixed-size field accumulated across partial reads.
///
/// The buffer is allocated at exactly the declared size, so a read aimed at
/// [`FieldBuf::unfilled`] can never consume bytes past the field boundary.
#[derive(Debug)]
struct FieldBuf {
    buf: Box<[u8]>,
    filled: usize,
}

impl FieldBuf {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len].into_boxed_slice(),
            filled: 0,
        }
    }

    /// The portion a read should target next.
    fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    fn advance(&mut self, n: usize) {
        self.filled += n;
        debug_assert!(self.filled <= self.buf.len());
    }

    fn is_complete(&self) -> bool {
        self.filled == self.buf.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[..self.filled]
    }
}

/// Outbound bytes with a cursor marking what the socket has accepted so far.
///
/// Short responses are built once and drained from the same buffer across as
/// many partial writes as the socket requires.
#[derive(Debug)]
pub struct WriteBuffer {
    buf: Vec<u8>,
    written: usize,
}

impl WriteBuffer {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, written: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Bytes not yet accepted by the socket.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.written..]
    }

    pub fn advance(&mut self, n: usize) {
        self.written += n;
        debug_assert!(self.written <= self.buf.len());
    }

    pub fn is_drained(&self) -> bool {
        self.written == self.buf.len()
    }
}

/// Incremental reader for the client's length-prefixed handshake string.
#[derive(Debug)]
pub struct HandshakeReader {
    len: FieldBuf,
    body: Option<FieldBuf>,
}

impl HandshakeReader {
    pub fn new() -> Self {
        Self {
            len: FieldBuf::new(4),
            body: None,
        }
    }

    /// Slice the next read should fill. Never larger than what the current
    /// field still needs.
    pub fn writable(&mut self) -> &mut [u8] {
        match &mut self.body {
            Some(body) => body.unfilled(),
            None => self.len.unfilled(),
        }
    }

    /// Registers `n` freshly read bytes; yields the complete handshake bytes
    /// once the declared length has been satisfied.
    pub fn consume(&mut self, n: usize) -> Result<Option<Vec<u8>>, ProtocolError> {
        match &mut self.body {
            None => {
                self.len.advance(n);
                if self.len.is_complete() {
                    let declared = read_u32(self.len.bytes());
                    if declared == 0 {
                        return Err(ProtocolError::EmptyField("handshake"));
                    }
                    if declared > MAX_HANDSHAKE_LENGTH {
                        return Err(ProtocolError::FieldTooLarge {
                            field: "handshake",
                            len: declared as u64,
                            max: MAX_HANDSHAKE_LENGTH as u64,
                        });
                    }
                    self.body = Some(FieldBuf::new(declared as usize));
                }
                Ok(None)
            }
            Some(body) => {
                body.advance(n);
                if body.is_complete() {
                    Ok(Some(body.bytes().to_vec()))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl Default for HandshakeReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
enum RequestPhase {
    Code(FieldBuf),
    NameLen { command: u32, len: FieldBuf },
    Name { command: u32, name: FieldBuf },
    Size { name: String, size: FieldBuf },
}

/// Incremental reader for one command frame: the 4-byte command code followed
/// by the fields that particular command carries.
#[derive(Debug)]
pub struct RequestReader {
    phase: RequestPhase,
}

impl RequestReader {
    pub fn new() -> Self {
        Self {
            phase: RequestPhase::Code(FieldBuf::new(4)),
        }
    }

    /// Slice the next read should fill, clamped to the current field's
    /// remaining bytes so the reader never swallows payload bytes that
    /// follow the header.
    pub fn writable(&mut self) -> &mut [u8] {
        match &mut self.phase {
            RequestPhase::Code(field) => field.unfilled(),
            RequestPhase::NameLen { len, .. } => len.unfilled(),
            RequestPhase::Name { name, .. } => name.unfilled(),
            RequestPhase::Size { size, .. } => size.unfilled(),
        }
    }

    /// Registers `n` freshly read bytes; yields the decoded request once all
    /// of its fields have arrived.
    pub fn consume(&mut self, n: usize) -> Result<Option<Request>, ProtocolError> {
        match &mut self.phase {
            RequestPhase::Code(field) => {
                field.advance(n);
                if !field.is_complete() {
                    return Ok(None);
                }
                let command = read_u32(field.bytes());
                match command {
                    FILE_LIST_REQUEST => Ok(Some(Request::ListFiles)),
                    FILE_SEND_REQUEST | FILE_UPLOAD_REQUEST => {
                        self.phase = RequestPhase::NameLen {
                            command,
                            len: FieldBuf::new(4),
                        };
                        Ok(None)
                    }
                    other => Err(ProtocolError::UnknownCommand(other)),
                }
            }
            RequestPhase::NameLen { command, len } => {
                len.advance(n);
                if !len.is_complete() {
                    return Ok(None);
                }
                let command = *command;
                let declared = read_u32(len.bytes());
                if declared == 0 {
                    return Err(ProtocolError::EmptyField("file name"));
                }
                if declared > MAX_FILE_NAME_LENGTH {
                    return Err(ProtocolError::FieldTooLarge {
                        field: "file name",
                        len: declared as u64,
                        max: MAX_FILE_NAME_LENGTH as u64,
                    });
                }
                self.phase = RequestPhase::Name {
                    command,
                    name: FieldBuf::new(declared as usize),
                };
                Ok(None)
            }
            RequestPhase::Name { command, name } => {
                name.advance(n);
                if !name.is_complete() {
                    return Ok(None);
                }
                let command = *command;
                let name = String::from_utf8(name.bytes().to_vec())
                    .map_err(|_| ProtocolError::InvalidUtf8("file name"))?;
                if command == FILE_SEND_REQUEST {
                    Ok(Some(Request::Download { name }))
                } else {
                    self.phase = RequestPhase::Size {
                        name,
                        size: FieldBuf::new(8),
                    };
                    Ok(None)
                }
            }
            RequestPhase::Size { name, size } => {
                size.advance(n);
                if !size.is_complete() {
                    return Ok(None);
                }
                let declared = read_u64(size.bytes());
                if declared > MAX_FILE_SIZE {
                    return Err(ProtocolError::FieldTooLarge {
                        field: "file size",
                        len: declared,
                        max: MAX_FILE_SIZE,
                    });
                }
                let name = std::mem::take(name);
                Ok(Some(Request::Upload {
                    name,
                    size: declared,
                }))
            }
        }
    }
}

impl Default for RequestReader {
    fn default() -> Self {
        Self::new()
    }
}
