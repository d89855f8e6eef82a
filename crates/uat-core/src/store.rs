//! In-memory slot/variable store.
//!
//! The store is plain data: it knows nothing about sessions or the wire.
//! Callers serialize access to it (the server keeps it behind one lock).

use crate::value::values_equal;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown slot: {0}")]
    UnknownSlot(String),
}

/// What an [`VariableStore::upsert`] did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The slot did not exist and was created holding just this variable.
    SlotCreated,
    /// The slot existed but the variable did not.
    VariableCreated,
    /// The variable existed with a different value.
    ValueChanged,
    /// The stored value already equals the new one; nothing was written.
    Unchanged,
}

impl ChangeKind {
    /// Whether clients need to hear about this upsert.
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SlotCreated => "slot_created",
            Self::VariableCreated => "variable_created",
            Self::ValueChanged => "value_changed",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{}", s)
    }
}

/// Variables of one slot, keyed by name.
pub type SlotVars = BTreeMap<String, Value>;

/// The authoritative mapping of slot → (name → value).
///
/// Iteration order is deterministic: slots ascending, then names
/// ascending within a slot.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    slots: BTreeMap<String, SlotVars>,
}

impl VariableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of slots with exactly `names`.
    ///
    /// Slots not in `names` are dropped together with their variables.
    /// Newly named slots start out empty. Existing slots keep their
    /// variables untouched.
    pub fn declare_slots<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: BTreeSet<String> = names.into_iter().map(Into::into).collect();

        let before = self.slots.len();
        self.slots.retain(|slot, _| wanted.contains(slot));
        let removed = before - self.slots.len();

        let mut created = 0usize;
        for slot in wanted {
            self.slots.entry(slot).or_insert_with(|| {
                created += 1;
                SlotVars::new()
            });
        }

        debug!(
            "Declared slots: {} created, {} removed, {} total",
            created,
            removed,
            self.slots.len()
        );
    }

    /// Looks up a single variable.
    pub fn get(&self, slot: &str, name: &str) -> Option<&Value> {
        self.slots.get(slot)?.get(name)
    }

    /// Returns whether `slot` currently exists, empty slot included.
    pub fn contains_slot(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }

    /// All non-empty slot names.
    pub fn list_slots(&self) -> BTreeSet<String> {
        self.slots
            .keys()
            .filter(|slot| !slot.is_empty())
            .cloned()
            .collect()
    }

    /// Enumerates every variable as `(slot, name, value)`.
    pub fn all_variables(&self) -> impl Iterator<Item = (&str, &str, &Value)> + '_ {
        self.slots.iter().flat_map(|(slot, vars)| {
            vars.iter()
                .map(move |(name, value)| (slot.as_str(), name.as_str(), value))
        })
    }

    /// Enumerates the variables of one slot as `(name, value)`.
    pub fn slot_variables(
        &self,
        slot: &str,
    ) -> Result<impl Iterator<Item = (&str, &Value)> + '_, StoreError> {
        let vars = self
            .slots
            .get(slot)
            .ok_or_else(|| StoreError::UnknownSlot(slot.to_string()))?;
        Ok(vars.iter().map(|(name, value)| (name.as_str(), value)))
    }

    /// Inserts or updates a variable and reports what changed.
    pub fn upsert(&mut self, slot: &str, name: &str, value: Value) -> ChangeKind {
        let Some(vars) = self.slots.get_mut(slot) else {
            let mut vars = SlotVars::new();
            vars.insert(name.to_string(), value);
            self.slots.insert(slot.to_string(), vars);
            return ChangeKind::SlotCreated;
        };

        match vars.get_mut(name) {
            None => {
                vars.insert(name.to_string(), value);
                ChangeKind::VariableCreated
            }
            Some(current) if values_equal(current, &value) => ChangeKind::Unchanged,
            Some(current) => {
                *current = value;
                ChangeKind::ValueChanged
            }
        }
    }

    /// Number of slots, empty slot included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Total number of variables across all slots.
    pub fn variable_count(&self) -> usize {
        self.slots.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
