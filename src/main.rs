//! Chat server - Entry Point
//!
//! Parses the command line, installs logging and runs the event loop.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use multiplex_chat::{ChatServer, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=multiplex_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multiplex_chat=info")),
        )
        .init();

    let config = ServerConfig::parse();
    let server = ChatServer::bind(&config)?;
    info!("Server is up and running on {}", server.local_addr());

    server.run()?;

    info!("The server is shut down");
    Ok(())
}
