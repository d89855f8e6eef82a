//! UAT protocol message types.
//!
//! Every server→client message is a JSON array of entries, each tagged by
//! its `cmd` field. Clients send arrays of command objects.

use crate::error::CommandError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uat_core::Var;

/// Version of the wire protocol announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 0;

/// A single server→client entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerMessage {
    /// Handshake sent once to every new connection.
    Info(InfoPayload),
    /// A variable value, either as a sync reply or a change notification.
    Var(Var),
    /// A command that could not be executed.
    ErrorReply(CommandError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoPayload {
    /// Display name of the server.
    pub name: String,
    /// Version string of the embedding application.
    pub version: String,
    /// Protocol version, see [`PROTOCOL_VERSION`].
    pub protocol: u32,
    /// Names of all non-empty slots.
    pub slots: Vec<String>,
}

impl ServerMessage {
    /// Builds a `Var` entry from borrowed store data.
    pub fn var(slot: &str, name: &str, value: &Value) -> Self {
        Self::Var(Var::new(slot, name, value.clone()))
    }
}

/// Serializes a batch of entries into one text frame payload.
pub fn encode_batch(entries: &[ServerMessage]) -> serde_json::Result<String> {
    serde_json::to_string(entries)
}

/// One command object from a client packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Value of the `cmd` field.
    pub name: String,
    /// The whole command object, `cmd` included.
    pub fields: Map<String, Value>,
}

/// Parameters of the `Sync` command.
#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    /// Restricts the dump to one slot. Absent or empty means every slot.
    #[serde(default)]
    pub slot: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReason;
    use serde_json::json;

    #[test]
    fn test_info_serialization() {
        let msg = ServerMessage::Info(InfoPayload {
            name: "Tracker".into(),
            version: "1.2".into(),
            protocol: PROTOCOL_VERSION,
            slots: vec!["A".into()],
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"cmd": "Info", "name": "Tracker", "version": "1.2", "protocol": 0, "slots": ["A"]})
        );
    }

    #[test]
    fn test_var_serialization() {
        let json = serde_json::to_string(&ServerMessage::var("", "hp", &json!(3))).unwrap();
        assert_eq!(json, r#"{"cmd":"Var","name":"hp","value":3}"#);

        let json = serde_json::to_string(&ServerMessage::var("A", "hp", &json!(3))).unwrap();
        assert_eq!(json, r#"{"cmd":"Var","slot":"A","name":"hp","value":3}"#);
    }

    #[test]
    fn test_error_reply_serialization() {
        let msg = ServerMessage::ErrorReply(CommandError::new("Sync", ErrorReason::BadValue).with_argument("slot"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"cmd": "ErrorReply", "name": "Sync", "reason": "bad-value", "argument": "slot"})
        );
    }

    #[test]
    fn test_batch_is_array() {
        let batch = encode_batch(&[ServerMessage::var("", "a", &json!(1))]).unwrap();
        assert!(batch.starts_with('['));
        let parsed: Vec<ServerMessage> = serde_json::from_str(&batch).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
