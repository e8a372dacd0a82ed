//! Multiplexed TCP Chat Server Library
//!
//! A line-based chat server that serves every client from one thread,
//! driven by a mio readiness loop.
//!
//! # Features
//! - Name handshake (`OK` / `EXIST`)
//! - Broadcast and private messages
//! - Renaming, online list, help and quit commands
//! - Per-user FIFO outbound queues drained on writability
//!
//! # Architecture
//! - `ChatServer` owns the poll, the listener, every `Connection` and the
//!   `Registry` of users
//! - Records are decoded by `protocol` and executed by `dispatcher`
//! - No locks needed - only the loop thread ever touches the state
//!
//! # Example
//! ```ignore
//! use multiplex_chat::{ChatServer, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ChatServer::bind(&ServerConfig::default())?;
//!     server.run()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use connection::{Connection, Phase, Watch};
pub use dispatcher::{dispatch, Outcome};
pub use error::{ConnectionError, ParseError, RegistryError, ServerError};
pub use message::Message;
pub use protocol::{decode, encode, Command, CommandKind};
pub use registry::Registry;
pub use server::{ChatServer, ShutdownHandle};
pub use types::{ConnectionId, SERVER_NAME};
pub use user::User;
