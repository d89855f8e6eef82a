//! Command handlers.
//!
//! Each handler implements one client command against a read-only view of
//! the store and returns the entries to append to the reply.

use crate::error::{CommandError, ErrorReason};
use crate::protocol::{Command, ServerMessage, SyncParams};
use crate::validator::CommandValidator;
use tracing::debug;
use uat_core::VariableStore;

/// Why a handler produced no entries.
#[derive(Debug)]
pub enum HandlerError {
    /// The command is rejected; the client gets an `ErrorReply`.
    Rejected(CommandError),
    /// Something unexpected broke; the whole message is aborted.
    Internal(String),
}

impl From<CommandError> for HandlerError {
    fn from(err: CommandError) -> Self {
        Self::Rejected(err)
    }
}

pub type HandlerResult = Result<Vec<ServerMessage>, HandlerError>;

/// Handles the `Sync` command.
///
/// With a non-empty `slot` dumps that slot, otherwise every variable.
pub fn handle_sync(
    store: &VariableStore,
    validator: &CommandValidator,
    command: &Command,
) -> HandlerResult {
    validator.check(command)?;

    let params: SyncParams = serde_json::from_value(serde_json::Value::Object(command.fields.clone()))
        .map_err(|e| HandlerError::Internal(e.to_string()))?;

    match params.slot.as_deref() {
        Some(slot) if !slot.is_empty() => {
            debug!("Sync slot: {}", slot);
            let vars = store.slot_variables(slot).map_err(|_| {
                CommandError::new(&command.name, ErrorReason::BadValue).with_argument("slot")
            })?;
            Ok(vars
                .map(|(name, value)| ServerMessage::var(slot, name, value))
                .collect())
        }
        _ => {
            debug!("Sync all ({} variables)", store.variable_count());
            Ok(store
                .all_variables()
                .map(|(slot, name, value)| ServerMessage::var(slot, name, value))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uat_core::Var;

    fn sync(fields: serde_json::Value) -> Command {
        let serde_json::Value::Object(fields) = fields else {
            panic!("command must be an object");
        };
        Command {
            name: "Sync".into(),
            fields,
        }
    }

    fn sample_store() -> VariableStore {
        let mut store = VariableStore::new();
        store.declare_slots(["A", "B", "Empty"]);
        store.upsert("A", "x", json!(1));
        store.upsert("A", "y", json!("two"));
        store.upsert("B", "z", json!([3]));
        store.upsert("", "g", json!(true));
        store
    }

    #[test]
    fn test_sync_all_includes_ungrouped() {
        let store = sample_store();
        let entries = handle_sync(&store, &CommandValidator::new(), &sync(json!({"cmd": "Sync"}))).unwrap();

        assert_eq!(
            entries,
            vec![
                ServerMessage::Var(Var::ungrouped("g", true)),
                ServerMessage::Var(Var::new("A", "x", 1)),
                ServerMessage::Var(Var::new("A", "y", "two")),
                ServerMessage::Var(Var::new("B", "z", json!([3]))),
            ]
        );
    }

    #[test]
    fn test_sync_empty_slot_means_all() {
        let store = sample_store();
        let entries = handle_sync(
            &store,
            &CommandValidator::new(),
            &sync(json!({"cmd": "Sync", "slot": ""})),
        )
        .unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_sync_one_slot() {
        let store = sample_store();
        let entries = handle_sync(
            &store,
            &CommandValidator::new(),
            &sync(json!({"cmd": "Sync", "slot": "A"})),
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                ServerMessage::Var(Var::new("A", "x", 1)),
                ServerMessage::Var(Var::new("A", "y", "two")),
            ]
        );

        let entries = handle_sync(
            &store,
            &CommandValidator::new(),
            &sync(json!({"cmd": "Sync", "slot": "Empty"})),
        )
        .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_sync_unknown_slot() {
        let store = sample_store();
        let result = handle_sync(
            &store,
            &CommandValidator::new(),
            &sync(json!({"cmd": "Sync", "slot": "Nope"})),
        );

        match result {
            Err(HandlerError::Rejected(err)) => {
                assert_eq!(err.reason, ErrorReason::BadValue);
                assert_eq!(err.argument.as_deref(), Some("slot"));
                assert_eq!(err.description, None);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_bad_slot_type() {
        let store = sample_store();
        let result = handle_sync(
            &store,
            &CommandValidator::new(),
            &sync(json!({"cmd": "Sync", "slot": {"name": "A"}})),
        );

        match result {
            Err(HandlerError::Rejected(err)) => {
                assert_eq!(err.reason, ErrorReason::BadValue);
                assert_eq!(err.argument.as_deref(), Some("slot"));
                assert!(err.description.is_some());
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
