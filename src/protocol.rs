//! Command protocol
//!
//! After the handshake every client record is a JSON envelope:
//!
//! ```text
//! {"command": "private", "params": ["@private", "bob", "hi"]}
//! ```
//!
//! `decode` turns an envelope into a typed [`Command`]; `encode` is the
//! client-side inverse that builds an envelope from a typed line.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Prefix that marks a typed line as a command
pub const COMMAND_SIGN: char = '@';

/// Wire envelope
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    command: String,
    params: Vec<String>,
}

/// Kind of a decoded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Name,
    Online,
    Private,
    Message,
    Quit,
    Invalid,
}

impl CommandKind {
    /// Look up a command by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "help" => Some(Self::Help),
            "name" => Some(Self::Name),
            "online" => Some(Self::Online),
            "private" => Some(Self::Private),
            "message" => Some(Self::Message),
            "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Decoded command, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Command name as the user typed it (shown in "unknown command" replies)
    pub name: String,
    /// Arguments; for `Message` the words of the text
    pub params: Vec<String>,
    /// Name of the issuing user
    pub user: String,
}

/// Decode one record from `user` into a command
///
/// Unrecognized command names are not an error: they decode to
/// `CommandKind::Invalid` so the dispatcher can answer uniformly.
pub fn decode(record: &str, user: &str) -> Result<Command, ParseError> {
    let Envelope { command, params } = serde_json::from_str(record)?;

    let Some(kind) = CommandKind::from_name(&command) else {
        // Clients map unknown words to "invalid" but still send the word itself.
        let name = params
            .first()
            .and_then(|p| p.strip_prefix(COMMAND_SIGN))
            .filter(|_| command == "invalid")
            .map(str::to_string)
            .unwrap_or(command);
        return Ok(Command {
            kind: CommandKind::Invalid,
            name,
            params: Vec::new(),
            user: user.to_string(),
        });
    };

    let params = if kind == CommandKind::Message {
        params
    } else {
        let mut args = params.into_iter().peekable();
        args.next_if(|p| p.starts_with(COMMAND_SIGN));
        args.filter(|p| !p.is_empty()).collect()
    };

    Ok(Command {
        kind,
        name: command,
        params,
        user: user.to_string(),
    })
}

/// Build the envelope for a line typed by a user
///
/// A leading `@word` picks the command (unknown words become `invalid`);
/// anything else is a plain `message`.
pub fn encode(line: &str) -> String {
    let params: Vec<String> = line.split(' ').map(str::to_string).collect();
    let command = match params[0].strip_prefix(COMMAND_SIGN) {
        Some(word) if CommandKind::from_name(word).is_some() => word.to_string(),
        Some(_) => "invalid".to_string(),
        None => "message".to_string(),
    };
    let envelope = Envelope { command, params };
    // An envelope of plain strings always serializes.
    serde_json::to_string(&envelope).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_private_drops_command_token() {
        let cmd = decode(r#"{"command":"private","params":["@private","bob","hi"]}"#, "alice")
            .unwrap();
        assert_eq!(cmd.kind, CommandKind::Private);
        assert_eq!(cmd.params, vec!["bob", "hi"]);
        assert_eq!(cmd.user, "alice");
    }

    #[test]
    fn test_decode_message_keeps_all_words() {
        let cmd = decode(r#"{"command":"message","params":["hello","@there"]}"#, "alice").unwrap();
        assert_eq!(cmd.kind, CommandKind::Message);
        assert_eq!(cmd.params, vec!["hello", "@there"]);
    }

    #[test]
    fn test_decode_ignores_empty_arguments() {
        let cmd = decode(r#"{"command":"name","params":["@name","","bob"]}"#, "alice").unwrap();
        assert_eq!(cmd.params, vec!["bob"]);
    }

    #[test]
    fn test_decode_unknown_command_is_invalid() {
        let cmd = decode(r#"{"command":"dance","params":[]}"#, "alice").unwrap();
        assert_eq!(cmd.kind, CommandKind::Invalid);
        assert_eq!(cmd.name, "dance");
    }

    #[test]
    fn test_decode_invalid_reports_typed_word() {
        let cmd = decode(r#"{"command":"invalid","params":["@dance","now"]}"#, "alice").unwrap();
        assert_eq!(cmd.kind, CommandKind::Invalid);
        assert_eq!(cmd.name, "dance");
    }

    #[test]
    fn test_decode_malformed_is_parse_error() {
        assert!(decode("not json", "alice").is_err());
        assert!(decode(r#"{"params":[]}"#, "alice").is_err());
        assert!(decode(r#"{"command":"help"}"#, "alice").is_err());
        assert!(decode(r#"{"command":1,"params":[]}"#, "alice").is_err());
    }

    #[test]
    fn test_encode_command_and_message() {
        let json: serde_json::Value = serde_json::from_str(&encode("@private bob hi")).unwrap();
        assert_eq!(json["command"], "private");
        assert_eq!(json["params"], serde_json::json!(["@private", "bob", "hi"]));

        let json: serde_json::Value = serde_json::from_str(&encode("good morning")).unwrap();
        assert_eq!(json["command"], "message");

        let json: serde_json::Value = serde_json::from_str(&encode("@dance")).unwrap();
        assert_eq!(json["command"], "invalid");
    }

    #[test]
    fn test_encoded_line_decodes_to_typed_command() {
        let cmd = decode(&encode("@name  bobby"), "bob").unwrap();
        assert_eq!(cmd.kind, CommandKind::Name);
        assert_eq!(cmd.params, vec!["bobby"]);
    }
}
