//! State files: a JSON snapshot of every slot and variable.
//!
//! ```json
//! {
//!   "": { "connected": true },
//!   "Player 1": { "hp": 10, "items": ["sword"] }
//! }
//! ```
//!
//! Top-level keys are slots (the empty key holds ungrouped variables),
//! nested keys are variable names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uat_core::Var;

#[derive(Error, Debug)]
pub enum StateFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid state file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed contents of a state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateFile {
    slots: BTreeMap<String, BTreeMap<String, Value>>,
}

impl StateFile {
    /// Reads and parses a state file.
    pub fn load(path: &Path) -> Result<Self, StateFileError> {
        let text = fs::read_to_string(path).map_err(|source| StateFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, StateFileError> {
        Ok(serde_json::from_str(text)?)
    }

    /// A small file showing the format.
    pub fn example() -> Self {
        let mut state = Self::default();
        state.insert(Var::ungrouped("connected", true));
        state.insert(Var::new("Player 1", "hp", 10));
        state.insert(Var::new("Player 1", "items", serde_json::json!(["sword"])));
        state.slots.entry("Player 2".to_string()).or_default();
        state
    }

    pub fn insert(&mut self, var: Var) {
        self.slots
            .entry(var.slot)
            .or_default()
            .insert(var.name, var.value);
    }

    /// Every slot key in the file, the empty one included.
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn variable_count(&self) -> usize {
        self.slots.values().map(BTreeMap::len).sum()
    }

    /// Variable count per slot.
    pub fn slot_sizes(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots.iter().map(|(slot, vars)| (slot.as_str(), vars.len()))
    }

    /// All variables as updates, slots and names ascending.
    pub fn vars(&self) -> Vec<Var> {
        self.slots
            .iter()
            .flat_map(|(slot, vars)| {
                vars.iter()
                    .map(move |(name, value)| Var::new(slot.as_str(), name.as_str(), value.clone()))
            })
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, StateFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
