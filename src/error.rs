//! Error types for the chat server
//!
//! Each failure domain gets its own enum so callers can decide between
//! tearing a connection down and replying to the user.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Transport errors on a single connection
///
/// Every variant is fatal to that connection and to nothing else.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Peer performed an orderly shutdown
    #[error("Connection closed by peer")]
    Closed,

    /// Socket-level failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent more than `limit` bytes without a line terminator
    #[error("Record exceeds {limit} bytes")]
    RecordTooLong { limit: usize },
}

/// Command envelope could not be decoded
///
/// Recoverable: the issuer gets a notice and the connection stays open.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not JSON, or missing `command`/`params`
    #[error("Malformed command envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// User registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another active user already has this name
    #[error("The name {0} is already taken")]
    NameTaken(String),

    /// Name collides with the server identity
    #[error("The name {0} is reserved")]
    NameReserved(String),

    /// Empty, or contains whitespace or control characters
    #[error("The name {0:?} is not allowed")]
    InvalidName(String),

    /// No active user has this name
    #[error("The user {0} doesn't exist.")]
    UnknownUser(String),
}

/// Server-level errors (fatal to the event loop)
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bind, poll or registration failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Host/port did not resolve to a socket address
    #[error("Cannot resolve address {0}")]
    Resolve(String),
}
