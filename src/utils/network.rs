//! Network utilities
//!
//! Best-effort discovery of the address peers should use, for the startup
//! connection guide. Nothing here affects wire behavior.

use std::net::{IpAddr, UdpSocket};

/// Local IPv4 address used for outbound traffic, when the host has one.
///
/// Connects a UDP socket to a public address and reads back the source
/// address the OS picked. No packet is actually sent.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        return None;
    }
    Some(addr.ip())
}

/// Prints a human-readable guide for connecting to the server.
pub fn print_connection_guide(port: u16) {
    println!("\n-------------------------------------------");
    println!("SERVER INITIALIZED ON PORT: {}", port);
    match local_ip() {
        Some(ip) => {
            println!("STATUS: Network Active");
            println!("-> Connect from other PCs on the same network via: {}", ip);
            println!("-> Connect from THIS PC via:    localhost");
        }
        None => {
            println!("STATUS: Offline / No Network Found");
            println!("-> Only programs on THIS computer can connect.");
            println!("-> Use: localhost (127.0.0.1)");
        }
    }
    println!("-------------------------------------------\n");
}
