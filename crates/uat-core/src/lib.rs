//! UAT Core - Slot/variable state for the UAT server
//!
//! This crate holds the authoritative variable state that the server
//! synchronizes to its clients. It has no networking dependencies.
//!
//! # Architecture
//!
//! Variables are addressed by `(slot, name)`. A slot is a named partition
//! of variables; the empty slot name groups variables that belong to no
//! slot in particular.
//!
//! # Example
//!
//! ```
//! use uat_core::{ChangeKind, VariableStore};
//! use serde_json::json;
//!
//! let mut store = VariableStore::new();
//! store.declare_slots(["Player 1"]);
//!
//! let kind = store.upsert("Player 1", "hp", json!(10));
//! assert_eq!(kind, ChangeKind::VariableCreated);
//!
//! let kind = store.upsert("Player 1", "hp", json!(10.0));
//! assert_eq!(kind, ChangeKind::Unchanged);
//! ```

mod store;
mod value;
mod var;

pub use store::{ChangeKind, StoreError, VariableStore};
pub use value::values_equal;
pub use var::Var;

/// Re-exported so downstream crates agree on the value type.
pub use serde_json::Value;
