//! User registry
//!
//! Maps live connections to users and their outbound queues. Users are
//! kept in registration order, which is also the order `list_names`
//! reports them in. All lookups are linear in the number of users.

use std::sync::Arc;

use tracing::debug;

use crate::error::RegistryError;
use crate::message::Message;
use crate::types::{is_reserved_name, ConnectionId};
use crate::user::User;

/// Reject names that are empty or contain whitespace or control characters
///
/// A name is rendered inside `[...]` on every line its owner sends, so it
/// must stay a single visible token.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// All active users, owned by the event loop
#[derive(Debug, Default)]
pub struct Registry {
    users: Vec<User>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Case-sensitive name lookup
    pub fn name_exists(&self, name: &str) -> bool {
        self.users.iter().any(|u| u.name == name)
    }

    /// Check a prospective name against the naming rules, the reserved
    /// identity and active users
    ///
    /// Both the handshake and `change_name` go through here.
    pub fn check_available(&self, name: &str) -> Result<(), RegistryError> {
        validate_name(name)?;
        if is_reserved_name(name) {
            return Err(RegistryError::NameReserved(name.to_string()));
        }
        if self.name_exists(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        Ok(())
    }

    pub fn connection_for_name(&self, name: &str) -> Option<ConnectionId> {
        self.users
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.connection)
    }

    pub fn name_for_connection(&self, conn: ConnectionId) -> Option<&str> {
        self.user(conn).map(|u| u.name.as_str())
    }

    /// Rename `old_name` to `new_name`
    ///
    /// Availability check and rename happen under one `&mut self` borrow,
    /// so no other operation can observe the registry in between.
    pub fn change_name(&mut self, old_name: &str, new_name: &str) -> Result<(), RegistryError> {
        self.check_available(new_name)?;
        let user = self
            .users
            .iter_mut()
            .find(|u| u.name == old_name)
            .ok_or_else(|| RegistryError::UnknownUser(old_name.to_string()))?;
        user.name = new_name.to_string();
        debug!("Renamed '{}' to '{}'", old_name, new_name);
        Ok(())
    }

    /// Names of all active users, in registration order
    pub fn list_names(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.name.as_str()).collect()
    }

    /// Register a user for `conn`
    ///
    /// The caller must have checked `check_available` first.
    pub fn add_connection(&mut self, conn: ConnectionId, name: String) {
        debug_assert!(self.user(conn).is_none(), "connection registered twice");
        debug_assert!(!self.name_exists(&name), "duplicate user name");
        self.users.push(User::new(conn, name));
    }

    /// Remove the user bound to `conn`, discarding its queue
    ///
    /// Returns the removed user, or `None` if `conn` had no user.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<User> {
        let index = self.users.iter().position(|u| u.connection == conn)?;
        let user = self.users.remove(index);
        debug!(
            "Removed '{}' ({} undelivered message(s) dropped)",
            user.name,
            user.pending_len()
        );
        Some(user)
    }

    /// Queue a message for one user
    pub fn enqueue_to_one(&mut self, name: &str, msg: Arc<Message>) -> Result<(), RegistryError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.name == name)
            .ok_or_else(|| RegistryError::UnknownUser(name.to_string()))?;
        user.push(msg);
        Ok(())
    }

    /// Queue a message for every user except its sender
    pub fn enqueue_to_all(&mut self, msg: Arc<Message>) {
        for user in self.users.iter_mut().filter(|u| u.name != msg.sender()) {
            user.push(Arc::clone(&msg));
        }
    }

    /// Pop the oldest queued message for `conn`
    pub fn dequeue_next(&mut self, conn: ConnectionId) -> Option<Arc<Message>> {
        self.users
            .iter_mut()
            .find(|u| u.connection == conn)
            .and_then(User::pop)
    }

    pub fn has_pending(&self, conn: ConnectionId) -> bool {
        self.user(conn).is_some_and(User::has_pending)
    }

    /// Connections of all active users
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.users.iter().map(|u| u.connection)
    }

    fn user(&self, conn: ConnectionId) -> Option<&User> {
        self.users.iter().find(|u| u.connection == conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for (i, name) in names.iter().enumerate() {
            registry.add_connection(ConnectionId(i + 10), name.to_string());
        }
        registry
    }

    fn drain(registry: &mut Registry, conn: ConnectionId) -> Vec<String> {
        std::iter::from_fn(|| registry.dequeue_next(conn))
            .map(|m| m.to_string())
            .collect()
    }

    #[test]
    fn test_lookup_both_directions() {
        let registry = registry_with(&["alice", "bob"]);

        assert!(registry.name_exists("alice"));
        assert!(!registry.name_exists("Alice"));
        assert_eq!(registry.connection_for_name("bob"), Some(ConnectionId(11)));
        assert_eq!(registry.name_for_connection(ConnectionId(10)), Some("alice"));
        assert_eq!(registry.name_for_connection(ConnectionId(99)), None);
    }

    #[test]
    fn test_list_names_registration_order() {
        let registry = registry_with(&["carol", "alice", "bob"]);
        assert_eq!(registry.list_names(), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_change_name_success() {
        let mut registry = registry_with(&["alice", "bob"]);

        assert_eq!(registry.change_name("alice", "alicia"), Ok(()));
        assert_eq!(registry.list_names(), vec!["alicia", "bob"]);
        assert_eq!(registry.connection_for_name("alicia"), Some(ConnectionId(10)));
    }

    #[test]
    fn test_change_name_rejects_taken_and_reserved() {
        let mut registry = registry_with(&["alice", "bob"]);

        assert_eq!(
            registry.change_name("alice", "bob"),
            Err(RegistryError::NameTaken("bob".to_string()))
        );
        assert_eq!(
            registry.change_name("alice", "server"),
            Err(RegistryError::NameReserved("server".to_string()))
        );
        assert_eq!(registry.list_names(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_change_name_rejects_malformed_names() {
        let mut registry = registry_with(&["alice", "bob"]);

        for bad in ["", "   ", " carol", "car ol", "SERVER\n", "eve\r", "tab\t", "nul\0"] {
            assert_eq!(
                registry.change_name("alice", bad),
                Err(RegistryError::InvalidName(bad.to_string()))
            );
        }
        assert_eq!(registry.list_names(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name("élodie_99").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a\u{2028}b").is_err());
    }

    #[test]
    fn test_rename_sequences_keep_names_unique() {
        let mut registry = registry_with(&["a", "b", "c"]);
        let attempts = [
            ("a", "b"),
            ("a", "d"),
            ("b", "SERVER"),
            ("c", "a"),
            ("d", "c"),
            ("b", "Server"),
            ("c", "e"),
            ("b", "c"),
        ];

        for (old, new) in attempts {
            let _ = registry.change_name(old, new);
            let mut names = registry.list_names();
            assert!(names.iter().all(|n| !is_reserved_name(n)));
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), total);
        }
        assert_eq!(registry.list_names(), vec!["e", "c", "a"]);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut registry = registry_with(&["alice", "bob", "carol"]);

        registry.enqueue_to_all(Message::new("alice", "hello"));

        assert!(drain(&mut registry, ConnectionId(10)).is_empty());
        assert_eq!(drain(&mut registry, ConnectionId(11)), vec!["[alice] hello"]);
        assert_eq!(drain(&mut registry, ConnectionId(12)), vec!["[alice] hello"]);
    }

    #[test]
    fn test_server_notice_reaches_everyone() {
        let mut registry = registry_with(&["alice", "bob"]);

        registry.enqueue_to_all(Message::server("notice"));

        assert!(registry.has_pending(ConnectionId(10)));
        assert!(registry.has_pending(ConnectionId(11)));
    }

    #[test]
    fn test_enqueue_to_one_unknown_user() {
        let mut registry = registry_with(&["alice"]);

        let result = registry.enqueue_to_one("bob", Message::new("alice", "hi"));

        assert_eq!(result, Err(RegistryError::UnknownUser("bob".to_string())));
        assert!(!registry.has_pending(ConnectionId(10)));
    }

    #[test]
    fn test_dequeue_fifo() {
        let mut registry = registry_with(&["alice", "bob"]);

        registry
            .enqueue_to_one("bob", Message::new("alice", "A"))
            .unwrap();
        registry
            .enqueue_to_one("bob", Message::new("alice", "B"))
            .unwrap();

        assert_eq!(
            drain(&mut registry, ConnectionId(11)),
            vec!["[alice] A", "[alice] B"]
        );
    }

    #[test]
    fn test_remove_discards_queue_only_for_that_user() {
        let mut registry = registry_with(&["alice", "bob"]);
        registry.enqueue_to_all(Message::server("one"));

        let removed = registry.remove_connection(ConnectionId(10)).unwrap();

        assert_eq!(removed.name, "alice");
        assert_eq!(registry.list_names(), vec!["bob"]);
        assert!(registry.dequeue_next(ConnectionId(10)).is_none());
        assert_eq!(drain(&mut registry, ConnectionId(11)), vec!["[SERVER] one"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = registry_with(&["alice"]);

        assert!(registry.remove_connection(ConnectionId(10)).is_some());
        assert!(registry.remove_connection(ConnectionId(10)).is_none());
        assert!(registry.is_empty());
    }
}
