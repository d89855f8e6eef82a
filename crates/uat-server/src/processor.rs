//! Inbound message processing.
//!
//! A message is a packet of commands. Commands are handled one by one;
//! a rejected command contributes an `ErrorReply` entry and processing
//! moves on, while any other failure aborts the whole message.

use crate::error::{CommandError, ProtocolError};
use crate::handlers::{handle_sync, HandlerError, HandlerResult};
use crate::protocol::{Command, ServerMessage};
use crate::validator::CommandValidator;
use tracing::debug;
use uat_core::VariableStore;

/// Result of handling one command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Entries to append to the reply, error entries included.
    Reply(Vec<ServerMessage>),
    /// The message must be abandoned and the connection closed.
    Fatal(ProtocolError),
}

/// Processes one raw inbound message and returns the reply batch.
///
/// An empty batch means nothing is sent back.
pub fn process_message(
    store: &VariableStore,
    validator: &CommandValidator,
    text: &str,
) -> Result<Vec<ServerMessage>, ProtocolError> {
    let packet: serde_json::Value = serde_json::from_str(text)?;
    let commands = validator
        .validate_packet(packet)
        .map_err(|issue| ProtocolError::Packet(issue.to_string()))?;

    let mut reply = Vec::new();
    for command in &commands {
        match dispatch(store, validator, command) {
            CommandOutcome::Reply(entries) => reply.extend(entries),
            CommandOutcome::Fatal(err) => return Err(err),
        }
    }

    Ok(reply)
}

type Handler = fn(&VariableStore, &CommandValidator, &Command) -> HandlerResult;

/// Command names and the handlers that implement them.
const HANDLERS: &[(&str, Handler)] = &[("Sync", handle_sync)];

fn find_handler(name: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(command, _)| *command == name)
        .map(|(_, handler)| *handler)
}

/// Routes one command to its handler.
pub fn dispatch(store: &VariableStore, validator: &CommandValidator, command: &Command) -> CommandOutcome {
    debug!("Processing command: {}", command.name);

    let result = match find_handler(&command.name) {
        Some(handler) => handler(store, validator, command),
        None => Err(HandlerError::Rejected(CommandError::unknown_command(
            command.name.as_str(),
        ))),
    };

    into_outcome(command, result)
}

fn into_outcome(command: &Command, result: HandlerResult) -> CommandOutcome {
    match result {
        Ok(entries) => CommandOutcome::Reply(entries),
        Err(HandlerError::Rejected(err)) => {
            debug!("Command rejected: {}", err);
            CommandOutcome::Reply(vec![ServerMessage::ErrorReply(err)])
        }
        Err(HandlerError::Internal(detail)) => CommandOutcome::Fatal(ProtocolError::Handler {
            command: command.name.clone(),
            detail,
        }),
    }
}
