//! ByteShare Server - Entry Point
//!
//! Binds the listener, prepares the storage directory, and hands control to
//! the single-threaded event loop.

use log::{error, info};
use std::io::{self, Write};
use std::sync::Arc;

use byteshare_server::Server;
use byteshare_server::auth::HandshakeSecret;
use byteshare_server::config::ServerConfig;
use byteshare_server::utils::print_connection_guide;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // env_logger picks up the RUST_LOG environment variable.
    env_logger::init();

    info!("Launching ByteShare server...");

    let config = match ServerConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let passphrase = match config.passphrase.clone() {
        Some(passphrase) => passphrase,
        None => match prompt_passphrase() {
            Ok(passphrase) => passphrase,
            Err(e) => {
                error!("Failed to read passphrase: {}", e);
                std::process::exit(1);
            }
        },
    };
    let secret = HandshakeSecret::from_passphrase(&passphrase);

    let server = match Server::bind(Arc::clone(&config), secret).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    print_connection_guide(config.port);
    server.run().await;
}

fn prompt_passphrase() -> io::Result<String> {
    println!("Please set up a password for the server.");
    print!("Enter password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
