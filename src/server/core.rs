//! Connection registry and event loop
//!
//! One task owns everything: the listening socket, every client session, and
//! the readiness multiplexing between them. Sessions are advanced exactly one
//! bounded step per readiness event, so a slow or hostile client can never
//! stall the others. No session is ever touched from another task.

use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::Ready;
use tokio::net::{TcpListener, TcpStream};

use crate::auth::HandshakeSecret;
use crate::config::ServerConfig;
use crate::session::{Advance, Session};

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    secret: Arc<HandshakeSecret>,
    sessions: HashMap<u64, Session<TcpStream>>,
    next_token: u64,
}

/// What one wait on the multiplexer produced.
enum LoopEvent {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Ready(u64, io::Result<Ready>),
}

impl Server {
    /// Binds the listener and prepares the storage directory.
    pub async fn bind(config: Arc<ServerConfig>, secret: HandshakeSecret) -> io::Result<Self> {
        std::fs::create_dir_all(config.server_root_path())?;
        info!("Server root directory: {}", config.server_root);

        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config,
            secret: Arc::new(secret),
            sessions: HashMap::new(),
            next_token: 0,
        })
    }

    /// Address the listener actually bound to (resolves port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop forever. One session's failure tears down that
    /// session only; the loop keeps serving everyone else.
    pub async fn run(mut self) {
        info!(
            "Waiting for connections (max {} clients)",
            self.config.max_clients
        );

        loop {
            let event = {
                let mut readiness: FuturesUnordered<_> = self
                    .sessions
                    .iter()
                    .map(|(&token, session)| {
                        let interest = session.interest();
                        let socket = session.io();
                        async move { (token, socket.ready(interest).await) }
                    })
                    .collect();

                tokio::select! {
                    accepted = self.listener.accept() => LoopEvent::Accepted(accepted),
                    Some((token, ready)) = readiness.next() => LoopEvent::Ready(token, ready),
                }
            };

            match event {
                LoopEvent::Accepted(Ok((stream, addr))) => self.admit(stream, addr),
                LoopEvent::Accepted(Err(e)) => error!("Error accepting connection: {}", e),
                LoopEvent::Ready(token, Ok(_)) => self.dispatch(token),
                LoopEvent::Ready(token, Err(e)) => {
                    warn!("Readiness wait failed for session {}: {}", token, e);
                    self.sessions.remove(&token);
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.sessions.len() >= self.config.max_clients {
            warn!(
                "Rejecting {}: {} clients already connected",
                addr,
                self.sessions.len()
            );
            // Dropping the stream closes the connection.
            return;
        }

        let token = self.next_token;
        self.next_token += 1;
        let session = Session::new(
            stream,
            addr,
            Arc::clone(&self.config),
            Arc::clone(&self.secret),
        );
        self.sessions.insert(token, session);
        info!(
            "Client {} just connected ({}/{} clients)",
            addr,
            self.sessions.len(),
            self.config.max_clients
        );
    }

    fn dispatch(&mut self, token: u64) {
        let Some(session) = self.sessions.get_mut(&token) else {
            return;
        };
        if let Advance::Closed = session.advance() {
            // Removal drops the socket and any open file handle before the
            // next multiplexer wait.
            let peer = session.peer();
            self.sessions.remove(&token);
            info!(
                "Session with {} closed ({} clients remain)",
                peer,
                self.sessions.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{
        self, FILE_DOWNLOAD, FILE_LIST_REQUEST, FILE_LIST_RESPONSE, FILE_SEND_REQUEST,
        FILE_UPLOAD_REQUEST, read_u32, read_u64,
    };
    use crate::storage::EMPTY_LIST_SENTINEL;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const PASSPHRASE: &str = "integration";

    async fn start_server(root: &std::path::Path) -> SocketAddr {
        let config = Arc::new(ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            server_root: root.display().to_string(),
            max_clients: 8,
            passphrase: None,
        });
        let secret = HandshakeSecret::from_passphrase(PASSPHRASE);
        let server = Server::bind(config, secret).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn connect_and_shake(addr: SocketAddr) -> TcpStream {
        let mut client = TcpStream::connect(addr).await.unwrap();
        let secret = HandshakeSecret::from_passphrase(PASSPHRASE);

        // Server speaks first.
        let mut len = [0u8; 4];
        client.read_exact(&mut len).await.unwrap();
        let mut greeting = vec![0u8; read_u32(&len) as usize];
        client.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, secret.as_bytes());

        client
            .write_all(&codec::handshake_frame(secret.as_bytes()))
            .await
            .unwrap();
        client
    }

    async fn send_upload(client: &mut TcpStream, name: &str, payload: &[u8]) {
        client
            .write_all(&FILE_UPLOAD_REQUEST.to_be_bytes())
            .await
            .unwrap();
        client
            .write_all(&(name.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(name.as_bytes()).await.unwrap();
        client
            .write_all(&(payload.len() as u64).to_be_bytes())
            .await
            .unwrap();
        client.write_all(payload).await.unwrap();
    }

    async fn request_list(client: &mut TcpStream) -> String {
        client
            .write_all(&FILE_LIST_REQUEST.to_be_bytes())
            .await
            .unwrap();
        let mut header = [0u8; 8];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(read_u32(&header[..4]), FILE_LIST_RESPONSE);
        let mut text = vec![0u8; read_u32(&header[4..]) as usize];
        client.read_exact(&mut text).await.unwrap();
        String::from_utf8(text).unwrap()
    }

    #[tokio::test]
    async fn upload_list_download_round_trip() {
        let dir = tempdir().unwrap();
        let addr = start_server(dir.path()).await;
        let mut client = connect_and_shake(addr).await;

        let payload = b"hello over the wire".to_vec();
        send_upload(&mut client, "greeting.txt", &payload).await;

        // No upload ack frame; the list response doubles as confirmation
        // because the session handles requests strictly in order.
        let listing = request_list(&mut client).await;
        assert_eq!(listing, "greeting.txt");

        client
            .write_all(&FILE_SEND_REQUEST.to_be_bytes())
            .await
            .unwrap();
        client.write_all(&12u32.to_be_bytes()).await.unwrap();
        client.write_all(b"greeting.txt").await.unwrap();

        let mut header = [0u8; 8];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(read_u32(&header[..4]), FILE_DOWNLOAD);
        let mut name = vec![0u8; read_u32(&header[4..]) as usize];
        client.read_exact(&mut name).await.unwrap();
        assert_eq!(name, b"greeting.txt");
        let mut size = [0u8; 8];
        client.read_exact(&mut size).await.unwrap();
        assert_eq!(read_u64(&size), payload.len() as u64);
        let mut body = vec![0u8; payload.len()];
        client.read_exact(&mut body).await.unwrap();
        assert_eq!(body, payload);

        assert_eq!(
            std::fs::read(dir.path().join("greeting.txt")).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn handshake_mismatch_closes_but_loop_keeps_accepting() {
        let dir = tempdir().unwrap();
        let addr = start_server(dir.path()).await;

        let mut bad_client = TcpStream::connect(addr).await.unwrap();
        let mut len = [0u8; 4];
        bad_client.read_exact(&mut len).await.unwrap();
        let mut greeting = vec![0u8; read_u32(&len) as usize];
        bad_client.read_exact(&mut greeting).await.unwrap();
        bad_client
            .write_all(&codec::handshake_frame(b"ByteShareHandShakewrong"))
            .await
            .unwrap();

        // Fail-closed: the server sends nothing further and drops us.
        let mut buf = [0u8; 1];
        assert_eq!(bad_client.read(&mut buf).await.unwrap(), 0);

        // A well-behaved client still gets served.
        let mut good_client = connect_and_shake(addr).await;
        let listing = request_list(&mut good_client).await;
        assert_eq!(listing, EMPTY_LIST_SENTINEL);
    }

    #[tokio::test]
    async fn disconnect_mid_upload_leaves_server_usable() {
        let dir = tempdir().unwrap();
        let addr = start_server(dir.path()).await;

        {
            let mut client = connect_and_shake(addr).await;
            let name = "never-finished.bin";
            client
                .write_all(&FILE_UPLOAD_REQUEST.to_be_bytes())
                .await
                .unwrap();
            client
                .write_all(&(name.len() as u32).to_be_bytes())
                .await
                .unwrap();
            client.write_all(name.as_bytes()).await.unwrap();
            // Declare 10 MB but send only a sliver, then vanish.
            client
                .write_all(&(10u64 * 1024 * 1024).to_be_bytes())
                .await
                .unwrap();
            client.write_all(&[0u8; 4096]).await.unwrap();
        }

        // Give the loop a moment to observe the disconnect and clean up.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut client = connect_and_shake(addr).await;
        let listing = request_list(&mut client).await;
        assert_eq!(listing, EMPTY_LIST_SENTINEL);
    }
}
