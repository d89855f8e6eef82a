//! Server state and the operations that act on it.
//!
//! A [`ServerContext`] owns everything a running server mutates: identity,
//! the variable store, the validator and the session registry. All of its
//! operations are synchronous; the transport keeps one context behind a
//! single lock so session handling and the mutation API never interleave.

use crate::error::ProtocolError;
use crate::processor::process_message;
use crate::protocol::{encode_batch, InfoPayload, ServerMessage, PROTOCOL_VERSION};
use crate::registry::{CloseKind, Session, SessionId, SessionInfo, SessionRegistry};
use crate::validator::CommandValidator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uat_core::{values_equal, Value, Var, VariableStore};

/// Identity, variables and sessions of one server instance.
#[derive(Debug)]
pub struct ServerContext {
    name: String,
    version: String,
    store: VariableStore,
    validator: CommandValidator,
    sessions: SessionRegistry,
}

impl ServerContext {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            store: VariableStore::new(),
            validator: CommandValidator::new(),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The handshake entry for a new connection.
    pub fn info_message(&self) -> ServerMessage {
        ServerMessage::Info(InfoPayload {
            name: self.name.clone(),
            version: self.version.clone(),
            protocol: PROTOCOL_VERSION,
            slots: self.store.list_slots().into_iter().collect(),
        })
    }

    /// Registers a new session and queues its handshake.
    pub fn open_session(&mut self, session: Session) -> SessionId {
        let id = self.sessions.register(session);
        match encode_batch(&[self.info_message()]) {
            Ok(info) => {
                self.sessions.send_to(&id, Arc::from(info));
            }
            Err(e) => warn!("Failed to encode handshake for {}: {}", id, e),
        }
        info!("Session {} opened ({} connected)", id, self.sessions.len());
        id
    }

    /// Drops a session from the registry.
    pub fn close_session(&mut self, id: &SessionId) -> Option<SessionInfo> {
        let session = self.sessions.deregister(id)?;
        info!("Session {} closed ({} connected)", id, self.sessions.len());
        Some(session.info())
    }

    /// Processes one inbound message from `id` and queues the reply for it.
    ///
    /// On error nothing is queued; the caller closes the connection.
    pub fn handle_message(&self, id: &SessionId, text: &str) -> Result<(), ProtocolError> {
        let reply = process_message(&self.store, &self.validator, text)?;
        if reply.is_empty() {
            return Ok(());
        }

        let payload = encode_batch(&reply)?;
        debug!("Replying to {} with {} entries", id, reply.len());
        self.sessions.send_to(id, Arc::from(payload));
        Ok(())
    }

    /// Replaces the set of slots. Nothing is broadcast.
    pub fn declare_slots<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.declare_slots(names);
    }

    /// Applies variable updates and broadcasts whatever actually changed.
    ///
    /// Updates are applied in order. Each variable is reported at most once,
    /// with its final value, and only if that differs from its value before
    /// the call. Returns the number of changed variables.
    pub fn apply_updates<I>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = Var>,
    {
        let mut seen = HashSet::new();
        let mut touched: Vec<(String, String, Option<Value>)> = Vec::new();

        for var in updates {
            if seen.insert((var.slot.clone(), var.name.clone())) {
                let before = self.store.get(&var.slot, &var.name).cloned();
                touched.push((var.slot.clone(), var.name.clone(), before));
            }
            let kind = self.store.upsert(&var.slot, &var.name, var.value);
            debug!("{}/{} ({})", var.slot, var.name, kind);
        }

        let changes: Vec<ServerMessage> = touched
            .into_iter()
            .filter_map(|(slot, name, before)| {
                let after = self.store.get(&slot, &name)?;
                match before {
                    Some(before) if values_equal(&before, after) => None,
                    _ => Some(ServerMessage::var(&slot, &name, after)),
                }
            })
            .collect();

        if changes.is_empty() {
            return 0;
        }

        match encode_batch(&changes) {
            Ok(payload) => {
                self.sessions.broadcast(Arc::from(payload));
            }
            Err(e) => warn!("Failed to encode {} changes: {}", changes.len(), e),
        }
        changes.len()
    }

    /// Asks every session to close because the server is stopping.
    pub fn close_all(&self) {
        info!("Closing {} sessions", self.sessions.len());
        self.sessions.close_all(CloseKind::GoingAway);
    }
}
