//! A single addressed variable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A variable value addressed by slot and name.
///
/// Serializes to the body of a `Var` entry: the `slot` key is left out
/// when the variable is ungrouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    /// Owning slot; empty for ungrouped variables.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slot: String,

    /// Variable name, unique within its slot.
    pub name: String,

    /// Current value.
    pub value: Value,
}

impl Var {
    /// Creates a new variable.
    pub fn new(slot: impl Into<String>, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            slot: slot.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a variable that belongs to no slot.
    pub fn ungrouped(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(String::new(), name, value)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.slot.is_empty() {
            write!(f, "{} = {}", self.name, self.value)
        } else {
            write!(f, "{}/{} = {}", self.slot, self.name, self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ungrouped_omits_slot() {
        let var = Var::ungrouped("hp", 10);
        let json = serde_json::to_value(&var).unwrap();
        assert_eq!(json, json!({"name": "hp", "value": 10}));
    }

    #[test]
    fn test_slotted_keeps_slot() {
        let var = Var::new("Player 1", "hp", json!([1, 2]));
        let json = serde_json::to_value(&var).unwrap();
        assert_eq!(json, json!({"slot": "Player 1", "name": "hp", "value": [1, 2]}));
    }

    #[test]
    fn test_display() {
        assert_eq!(Var::new("A", "x", true).to_string(), "A/x = true");
        assert_eq!(Var::ungrouped("x", "s").to_string(), "x = \"s\"");
    }
}
