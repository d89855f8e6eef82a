//! Connected sessions.
//!
//! A session is the server-side view of one client: an id, the peer
//! address, and the queue its connection's writer task drains.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier of a session.
pub type SessionId = Uuid;

/// How a session should be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// The client sent something unprocessable. Carries the reason text.
    ProtocolViolation(String),
    /// The server is shutting down.
    GoingAway,
}

/// An item queued for a session's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame; broadcasts share one allocation.
    Text(Arc<str>),
    /// Answer to a client ping.
    Pong(Vec<u8>),
    /// Send a close frame and stop writing.
    Close(CloseKind),
}

/// One connected client.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    /// Creates a session with a fresh id.
    pub fn new(peer: SocketAddr, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            connected_at: Utc::now(),
            tx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queues an item for the client.
    ///
    /// Returns `false` if the connection is already gone; the item is
    /// dropped in that case.
    pub fn send(&self, item: Outbound) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn send_text(&self, text: Arc<str>) -> bool {
        self.send(Outbound::Text(text))
    }

    pub fn close(&self, kind: CloseKind) -> bool {
        self.send(Outbound::Close(kind))
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer,
            connected_at: self.connected_at,
        }
    }
}

/// Diagnostic snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Live sessions indexed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and returns its id.
    pub fn register(&mut self, session: Session) -> SessionId {
        let id = session.id;
        debug!("Registered session {} ({})", id, session.peer);
        self.sessions.insert(id, session);
        id
    }

    /// Removes a session; unknown ids are ignored.
    pub fn deregister(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id);
        if let Some(session) = &session {
            debug!("Deregistered session {} ({})", id, session.peer);
        }
        session
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Sends text to one session. Returns `false` if it is unknown or gone.
    pub fn send_to(&self, id: &SessionId, text: Arc<str>) -> bool {
        self.sessions
            .get(id)
            .map(|session| session.send_text(text))
            .unwrap_or(false)
    }

    /// Sends the same text to every session. Returns how many accepted it.
    pub fn broadcast(&self, text: Arc<str>) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values() {
            if session.send_text(text.clone()) {
                delivered += 1;
            } else {
                warn!("Failed to queue broadcast for session {}", session.id);
            }
        }
        debug!(
            "Broadcast to {}/{} sessions",
            delivered,
            self.sessions.len()
        );
        delivered
    }

    /// Asks every session to close. Sessions stay registered until their
    /// connections wind down.
    pub fn close_all(&self, kind: CloseKind) {
        for session in self.sessions.values() {
            session.close(kind.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new("127.0.0.1:4000".parse().unwrap(), tx);
        (session, rx)
    }

    #[test]
    fn test_register_deregister() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = make_session();

        let id = registry.register(session);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());

        assert!(registry.deregister(&id).is_some());
        assert!(registry.is_empty());
        assert!(registry.deregister(&id).is_none());
    }

    #[test]
    fn test_session_ids_unique() {
        let (a, _ra) = make_session();
        let (b, _rb) = make_session();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_send_to_one() {
        let mut registry = SessionRegistry::new();
        let (a, mut rx_a) = make_session();
        let (b, mut rx_b) = make_session();
        let id_a = registry.register(a);
        registry.register(b);

        assert!(registry.send_to(&id_a, Arc::from("hello")));

        assert_eq!(rx_a.recv().await, Some(Outbound::Text(Arc::from("hello"))));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown() {
        let registry = SessionRegistry::new();
        assert!(!registry.send_to(&Uuid::new_v4(), Arc::from("x")));
    }

    #[test]
    fn test_broadcast_counts_closed() {
        let mut registry = SessionRegistry::new();
        let (a, mut rx_a) = make_session();
        let (b, rx_b) = make_session();
        registry.register(a);
        registry.register(b);
        drop(rx_b);

        assert_eq!(registry.broadcast(Arc::from("[]")), 1);
        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Text(Arc::from("[]")));
    }

    #[test]
    fn test_close_all() {
        let mut registry = SessionRegistry::new();
        let (a, mut rx_a) = make_session();
        let (b, mut rx_b) = make_session();
        registry.register(a);
        registry.register(b);

        registry.close_all(CloseKind::GoingAway);

        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Close(CloseKind::GoingAway));
        assert_eq!(rx_b.try_recv().unwrap(), Outbound::Close(CloseKind::GoingAway));
        assert_eq!(registry.len(), 2);
    }
}
