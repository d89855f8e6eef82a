//! UAT Watcher - variable feeds for the UAT server
//!
//! Reads variable state from JSON state files and watches them for
//! changes, so a server can be fed without writing an embedding
//! application.

mod state;
mod watcher;

pub use state::{StateFile, StateFileError};
pub use watcher::{watch_state_file, WatchError};
