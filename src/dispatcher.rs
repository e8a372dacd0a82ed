//! Command dispatcher
//!
//! Executes one decoded [`Command`] against the registry. Every invalid
//! input is answered with a server notice to the issuer; dispatch itself
//! cannot fail.

use tracing::{debug, info};

use crate::message::Message;
use crate::protocol::{Command, CommandKind};
use crate::registry::Registry;
use crate::types::ConnectionId;

const HELP_TEXT: &str = "\
You can send messages to all the other users connected.
Messages that start with @ are treated as special commands. The possible commands are:
@help - list all commands.
@private [user] [msg] - send a private message to user with the specified text.
@name [new_name] - changes your name to new_name, if not taken already.
@online - shows a list of all the users currently online.
@quit - quits the chat.";

/// What the event loop must do after a command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep serving the connection
    Continue,
    /// The user is gone; close this connection
    Disconnect(ConnectionId),
}

/// Run a command issued by `cmd.user`
pub fn dispatch(registry: &mut Registry, cmd: Command) -> Outcome {
    debug!("Dispatching {:?} from '{}'", cmd.kind, cmd.user);
    match cmd.kind {
        CommandKind::Help => handle_help(registry, &cmd.user),
        CommandKind::Name => handle_name(registry, &cmd.user, &cmd.params),
        CommandKind::Online => handle_online(registry, &cmd.user),
        CommandKind::Message => handle_message(registry, &cmd.user, &cmd.params),
        CommandKind::Private => handle_private(registry, &cmd.user, &cmd.params),
        CommandKind::Quit => return handle_quit(registry, &cmd.user),
        CommandKind::Invalid => handle_invalid(registry, &cmd.user, &cmd.name),
    }
    Outcome::Continue
}

/// Queue a server notice for one user
///
/// The issuer is always present while its own command runs.
pub fn reply(registry: &mut Registry, user: &str, text: impl Into<String>) {
    if let Err(e) = registry.enqueue_to_one(user, Message::server(text)) {
        debug!("Dropping reply: {}", e);
    }
}

/// Queue a server notice for every user
pub fn announce(registry: &mut Registry, text: impl Into<String>) {
    registry.enqueue_to_all(Message::server(text));
}

/// One notice per help line, so every wire line carries the `[SERVER]` prefix
fn handle_help(registry: &mut Registry, user: &str) {
    for line in HELP_TEXT.lines() {
        reply(registry, user, line);
    }
}

fn handle_name(registry: &mut Registry, user: &str, params: &[String]) {
    let Some(new_name) = params.first() else {
        reply(
            registry,
            user,
            "Wrong syntax! the syntax of the name command is: @name [new_name]",
        );
        return;
    };

    match registry.change_name(user, new_name) {
        Ok(()) => {
            info!("User '{}' changed name to '{}'", user, new_name);
            announce(registry, format!("{} changed name to {}", user, new_name));
        }
        Err(e) => reply(registry, user, e.to_string()),
    }
}

fn handle_online(registry: &mut Registry, user: &str) {
    let names = registry.list_names().join(", ");
    reply(registry, user, names);
}

fn handle_message(registry: &mut Registry, user: &str, params: &[String]) {
    registry.enqueue_to_all(Message::new(user, params.join(" ")));
}

fn handle_private(registry: &mut Registry, user: &str, params: &[String]) {
    let [recipient, words @ ..] = params else {
        return private_syntax(registry, user);
    };
    if words.is_empty() {
        return private_syntax(registry, user);
    }

    // Single-threaded dispatch: the recipient cannot vanish between this
    // lookup and the enqueue.
    if let Err(e) = registry.enqueue_to_one(recipient, Message::new(user, words.join(" "))) {
        reply(registry, user, e.to_string());
        return;
    }
    debug!("Private message from '{}' to '{}'", user, recipient);
}

fn private_syntax(registry: &mut Registry, user: &str) {
    reply(
        registry,
        user,
        "Wrong syntax! the syntax of the private command is: @private [user] [message]",
    );
}

fn handle_quit(registry: &mut Registry, user: &str) -> Outcome {
    let Some(conn) = registry.connection_for_name(user) else {
        return Outcome::Continue;
    };
    registry.remove_connection(conn);
    info!("User '{}' quit", user);
    announce(registry, format!("{} has quit the chat", user));
    Outcome::Disconnect(conn)
}

fn handle_invalid(registry: &mut Registry, user: &str, name: &str) {
    reply(
        registry,
        user,
        format!("The command {} doesn't exist. see @help for list of commands", name),
    );
}
