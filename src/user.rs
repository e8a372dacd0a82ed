//! User struct definition
//!
//! Represents a named chat participant bound to one connection,
//! together with the messages still waiting to be written to it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::message::Message;
use crate::types::ConnectionId;

/// Registered chat user
#[derive(Debug)]
pub struct User {
    /// Connection this user is bound to
    pub connection: ConnectionId,
    /// Display name (unique among active users)
    pub name: String,
    /// Messages not yet written to the socket, oldest first
    queue: VecDeque<Arc<Message>>,
}

impl User {
    /// Create a new user with an empty outbound queue
    pub fn new(connection: ConnectionId, name: String) -> Self {
        Self {
            connection,
            name,
            queue: VecDeque::new(),
        }
    }

    /// Append a message to the outbound queue
    pub fn push(&mut self, msg: Arc<Message>) {
        self.queue.push_back(msg);
    }

    /// Take the oldest queued message
    pub fn pop(&mut self) -> Option<Arc<Message>> {
        self.queue.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }
}
