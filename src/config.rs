//! Server configuration
//!
//! Layered configuration: built-in defaults, then an optional
//! `byteshare.toml` file, then `BYTESHARE_*` environment overrides.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to (loopback vs all interfaces).
    pub bind_address: String,

    /// TCP port for client connections.
    pub port: u16,

    /// Directory holding uploaded and served files. Created on startup if
    /// absent.
    pub server_root: String,

    /// Concurrent session cap; connections beyond it are dropped at accept.
    pub max_clients: usize,

    /// Optional preset passphrase. When absent, the operator is prompted at
    /// startup.
    pub passphrase: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 1234,
            server_root: "./byteshare_root".to_string(),
            max_clients: 64,
            passphrase: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, file, and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0")?
            .set_default("port", 1234_i64)?
            .set_default("server_root", "./byteshare_root")?
            .set_default("max_clients", 64_i64)?
            .add_source(File::with_name("byteshare").required(false))
            .add_source(Environment::with_prefix("BYTESHARE"))
            .build()?
            .try_deserialize()
    }

    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }
}
