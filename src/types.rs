//! Basic type definitions for the chat server
//!
//! Provides the connection identifier newtype and the reserved
//! server identity used as the sender of every server notice.

use mio::Token;

/// Sender name used for all server-originated notices.
///
/// No user may take this name, in any casing.
pub const SERVER_NAME: &str = "SERVER";

/// Returns true if `name` is the reserved server identity (case-insensitive).
///
/// Uses full Unicode uppercasing, so forms like `ſerver` are caught too.
pub fn is_reserved_name(name: &str) -> bool {
    name.to_uppercase() == SERVER_NAME
}

/// Unique connection identifier (newtype pattern)
///
/// Doubles as the mio `Token` the connection is registered under, so a
/// readiness event maps straight back to its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

impl ConnectionId {
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl From<Token> for ConnectionId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_name_any_case() {
        assert!(is_reserved_name("SERVER"));
        assert!(is_reserved_name("server"));
        assert!(is_reserved_name("SeRvEr"));
        assert!(!is_reserved_name("servers"));
        assert!(!is_reserved_name("alice"));
    }

    #[test]
    fn test_reserved_name_unicode_uppercase() {
        assert!(is_reserved_name("ſerver"));
        assert!(is_reserved_name("ſERVER"));
    }

    #[test]
    fn test_connection_id_token_round_trip() {
        let id = ConnectionId(42);
        assert_eq!(id.token(), Token(42));
        assert_eq!(ConnectionId::from(Token(42)), id);
        assert_eq!(id.to_string(), "#42");
    }
}
