//! Command-line configuration for the chat server

use std::net::{SocketAddr, ToSocketAddrs};

use clap::Parser;

use crate::error::ServerError;

/// Single-threaded TCP chat server.
#[derive(Parser, Debug, Clone)]
#[command(name = "multiplex_chat", version, about)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// TCP port to listen on (0 picks a free port).
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Longest accepted record in bytes; longer input drops the connection.
    #[arg(long, default_value = "2048")]
    pub max_record_len: usize,

    /// Readiness events fetched per poll.
    #[arg(long, default_value = "1024")]
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_record_len: 2048,
            events_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` to the first matching socket address.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        let target = format!("{}:{}", self.host, self.port);
        target
            .to_socket_addrs()?
            .next()
            .ok_or(ServerError::Resolve(target))
    }
}
