//! Error types for the server.
//!
//! Two tiers: a [`CommandError`] rejects one command and is sent back to
//! the client as an `ErrorReply` entry; a [`ProtocolError`] aborts the whole
//! message and closes the connection.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Longest close reason a WebSocket close frame can carry.
const MAX_CLOSE_REASON: usize = 123;

/// Why a command was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    /// Validation failed at the command root without a named argument.
    Unknown,
    /// A required argument was not given.
    MissingArgument,
    /// An argument was given with an unusable value.
    BadValue,
    /// The command name is not known to the server.
    UnknownCommand,
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::MissingArgument => "missing-argument",
            Self::BadValue => "bad-value",
            Self::UnknownCommand => "unknown-command",
        };
        write!(f, "{}", s)
    }
}

/// A per-command failure. Serializes as the body of an `ErrorReply` entry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "{reason}: {command}{}{}",
    suffix(".", .argument),
    suffix(": ", .description)
)]
pub struct CommandError {
    /// Name of the failing command.
    #[serde(rename = "name")]
    pub command: String,

    pub reason: ErrorReason,

    /// Offending argument, if one could be attributed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,

    /// Validator's description of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CommandError {
    pub fn new(command: impl Into<String>, reason: ErrorReason) -> Self {
        Self {
            command: command.into(),
            reason,
            argument: None,
            description: None,
        }
    }

    /// Rejection of a command name the server does not handle.
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::new(command, ErrorReason::UnknownCommand)
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn suffix(separator: &str, part: &Option<String>) -> String {
    part.as_ref()
        .map(|part| format!("{}{}", separator, part))
        .unwrap_or_default()
}

/// A fatal failure while processing one inbound message.
///
/// The connection is closed with the error text as close reason; nothing
/// accumulated for the message is sent.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("Packet validation failed: {0}")]
    Packet(String),

    #[error("Exception while handling {command}: {detail}")]
    Handler { command: String, detail: String },

    #[error("Binary message is not valid UTF-8")]
    NotText,
}

impl ProtocolError {
    /// The error text cut down to what fits into a close frame.
    pub fn close_reason(&self) -> String {
        let mut reason = self.to_string();
        if reason.len() > MAX_CLOSE_REASON {
            let mut end = MAX_CLOSE_REASON;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        reason
    }
}

/// Errors from running the server itself.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Could not listen on any of ports {ports:?}: {source}")]
    Bind { ports: Vec<u16>, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::unknown_command("Bogus");
        assert_eq!(err.to_string(), "unknown-command: Bogus");

        let err = CommandError::new("Sync", ErrorReason::BadValue).with_argument("slot");
        assert_eq!(err.to_string(), "bad-value: Sync.slot");

        let err = CommandError::new("Sync", ErrorReason::Unknown).with_description("not an object");
        assert_eq!(err.to_string(), "unknown: Sync: not an object");

        let err = CommandError::new("Sync", ErrorReason::BadValue)
            .with_argument("slot")
            .with_description("Expected string, got number.");
        assert_eq!(err.to_string(), "bad-value: Sync.slot: Expected string, got number.");

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_reason_wire_names() {
        let names: Vec<String> = [
            ErrorReason::Unknown,
            ErrorReason::MissingArgument,
            ErrorReason::BadValue,
            ErrorReason::UnknownCommand,
        ]
        .iter()
        .map(|r| serde_json::to_value(r).unwrap().as_str().unwrap().to_string())
        .collect();

        assert_eq!(
            names,
            vec!["unknown", "missing-argument", "bad-value", "unknown-command"]
        );
    }

    #[test]
    fn test_close_reason_truncated() {
        let err = ProtocolError::Handler {
            command: "Sync".into(),
            detail: "é".repeat(100),
        };
        let reason = err.close_reason();
        assert!(reason.len() <= MAX_CLOSE_REASON);
        assert!(reason.starts_with("Exception while handling Sync: "));
    }
}
