//! Chat message value
//!
//! A `Message` is created once and shared by `Arc` into every recipient
//! queue it is delivered to. Control characters are replaced on creation,
//! so a message always renders as exactly one wire line.

use std::sync::Arc;

use crate::types::SERVER_NAME;

/// Immutable chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: String,
    text: String,
}

impl Message {
    /// Create a message from a user
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            sender: single_line(sender.into()),
            text: single_line(text.into()),
        })
    }

    /// Create a server notice
    pub fn server(text: impl Into<String>) -> Arc<Self> {
        Self::new(SERVER_NAME, text)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render as one wire line: `[sender] text\n`
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

/// Replace line breaks and other control characters with spaces
fn single_line(s: String) -> String {
    if !s.chars().any(char::is_control) {
        return s;
    }
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.sender, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_line_format() {
        let msg = Message::new("alice", "hi there");
        assert_eq!(msg.to_string(), "[alice] hi there");
        assert_eq!(msg.to_line(), "[alice] hi there\n");
    }

    #[test]
    fn test_line_breaks_cannot_forge_lines() {
        let msg = Message::new("bob", "hi\n[SERVER] carol has joined the chat!\r\x1b");
        assert_eq!(msg.text(), "hi [SERVER] carol has joined the chat!  ");
        assert_eq!(msg.to_line().matches('\n').count(), 1);
        assert!(!msg.to_line().contains('\r'));
    }

    #[test]
    fn test_server_notice_sender() {
        let msg = Message::server("bob has joined the chat!");
        assert_eq!(msg.sender(), "SERVER");
        assert_eq!(msg.text(), "bob has joined the chat!");
    }
}
