//! WebSocket server implementation.
//!
//! Accepts client connections, performs the handshake, routes inbound
//! messages to the shared [`ServerContext`] and forwards everything queued
//! for a session to its socket.

use crate::context::ServerContext;
use crate::error::{ProtocolError, ServerError};
use crate::registry::{CloseKind, Outbound, Session, SessionId, SessionInfo};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uat_core::Var;

/// Port tried first.
pub const DEFAULT_PORT: u16 = 65399;
/// Port tried when the default one is taken.
pub const FALLBACK_PORT: u16 = 44444;

/// How long a session may take to answer a close frame before its socket
/// is dropped.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Server state shared between connections and the mutation API.
pub type SharedState = Arc<RwLock<ServerContext>>;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: IpAddr,
    /// Port tried first.
    pub port: u16,
    /// Port tried if `port` cannot be bound.
    pub fallback_port: Option<u16>,
    /// Display name announced in the handshake.
    pub name: String,
    /// Version string announced in the handshake.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            fallback_port: Some(FALLBACK_PORT),
            name: "UAT Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Ports in the order they are tried.
    pub fn ports(&self) -> Vec<u16> {
        std::iter::once(self.port).chain(self.fallback_port).collect()
    }
}

struct Listening {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// The UAT WebSocket server.
pub struct UatServer {
    config: ServerConfig,
    state: SharedState,
    listening: Option<Listening>,
}

impl UatServer {
    /// Creates a server; nothing is bound until [`UatServer::start`].
    pub fn new(config: ServerConfig) -> Self {
        let context = ServerContext::new(config.name.clone(), config.version.clone());
        Self {
            config,
            state: Arc::new(RwLock::new(context)),
            listening: None,
        }
    }

    /// Returns a cloneable handle for the mutation API.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: self.state.clone(),
        }
    }

    /// Address the server is listening on, if started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|l| l.addr)
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Tries the configured port, then the fallback port. Calling this on a
    /// running server returns the existing address.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(listening) = &self.listening {
            return Ok(listening.addr);
        }

        let listener = bind_with_fallback(&self.config).await?;
        let addr = listener.local_addr()?;
        info!("UAT server listening on ws://{}", addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.state.clone();
        let accept_task = tokio::spawn(accept_loop(listener, state, shutdown_rx));

        self.listening = Some(Listening {
            addr,
            shutdown_tx,
            accept_task,
        });
        Ok(addr)
    }

    /// Stops accepting connections, then closes every session.
    pub async fn stop(&mut self) {
        let Some(listening) = self.listening.take() else {
            return;
        };

        info!("Stop listening on {}", listening.addr);
        let _ = listening.shutdown_tx.send(true);
        if let Err(e) = listening.accept_task.await {
            error!("Accept loop ended abnormally: {}", e);
        }

        self.state.read().await.close_all();
    }
}

/// A cloneable handle to the server's administrative surface.
#[derive(Clone)]
pub struct ServerHandle {
    state: SharedState,
}

impl ServerHandle {
    /// Wraps an existing context, e.g. for embedding without a listener.
    pub fn from_context(context: ServerContext) -> Self {
        Self {
            state: Arc::new(RwLock::new(context)),
        }
    }

    pub async fn set_name(&self, name: impl Into<String>) {
        self.state.write().await.set_name(name);
    }

    pub async fn set_version(&self, version: impl Into<String>) {
        self.state.write().await.set_version(version);
    }

    /// Replaces the declared slot set. Clients are not notified.
    pub async fn set_slots<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().await.declare_slots(names);
    }

    /// Pushes variable values; changes are broadcast to every session.
    ///
    /// Returns the number of variables that changed.
    pub async fn set_vars<I>(&self, vars: I) -> usize
    where
        I: IntoIterator<Item = Var>,
    {
        self.state.write().await.apply_updates(vars)
    }

    /// Non-empty slot names currently declared.
    pub async fn slots(&self) -> Vec<String> {
        self.state.read().await.store().list_slots().into_iter().collect()
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.state
            .read()
            .await
            .sessions()
            .iter()
            .map(Session::info)
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions().len()
    }
}

/// Binds the first port that is available.
async fn bind_with_fallback(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let ports = config.ports();
    let mut last_error = io::Error::new(io::ErrorKind::AddrNotAvailable, "no port configured");

    for &port in &ports {
        let addr = SocketAddr::new(config.host, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                warn!("Could not listen on {}: {}", addr, e);
                last_error = e;
            }
        }
    }

    Err(ServerError::Bind {
        ports,
        source: last_error,
    })
}

/// Accepts connections until shutdown is signalled.
async fn accept_loop(listener: TcpListener, state: SharedState, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!("Accept loop stopped");
}

/// Handles a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    info!("WebSocket connection established with {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let (closing_tx, mut closing_rx) = watch::channel(false);

    // Registration queues the handshake before any broadcast can.
    let id = state.write().await.open_session(Session::new(addr, tx.clone()));

    let writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let result = match item {
                Outbound::Text(text) => write.send(Message::Text(text.to_string())).await,
                Outbound::Pong(data) => write.send(Message::Pong(data)).await,
                Outbound::Close(kind) => {
                    let _ = write.send(Message::Close(Some(close_frame(kind)))).await;
                    let _ = closing_tx.send(true);
                    break;
                }
            };
            if let Err(e) = result {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
    });

    // Set once our close frame is out; the peer then has until the deadline
    // to answer it.
    let mut deadline: Option<Instant> = None;

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, read.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!("Client {} did not answer close, dropping", addr);
                    break;
                }
            },
            None => tokio::select! {
                next = read.next() => next,
                changed = closing_rx.changed() => {
                    if changed.is_err() {
                        // writer gone without closing: the socket is broken
                        break;
                    }
                    deadline = Some(Instant::now() + CLOSE_TIMEOUT);
                    continue;
                }
            },
        };
        let Some(msg) = next else {
            break;
        };

        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    reject(&tx, &id, ProtocolError::NotText);
                    break;
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Outbound::Pong(data));
                continue;
            }
            Ok(Message::Close(_)) => {
                debug!("Client {} disconnected", addr);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Message error from {}: {}", addr, e);
                break;
            }
        };

        if deadline.is_some() {
            debug!("Ignoring message from closing client {}", addr);
            continue;
        }

        debug!("Message from {}: {}", addr, text);
        let result = state.read().await.handle_message(&id, &text);
        if let Err(e) = result {
            reject(&tx, &id, e);
            break;
        }
    }

    state.write().await.close_session(&id);
    drop(tx);
    let _ = writer.await;

    info!("Connection closed: {}", addr);
    Ok(())
}

/// Queues a protocol-violation close for a session.
fn reject(tx: &mpsc::UnboundedSender<Outbound>, id: &SessionId, err: ProtocolError) {
    warn!("Closing session {}: {}", id, err);
    let _ = tx.send(Outbound::Close(CloseKind::ProtocolViolation(err.close_reason())));
}

fn close_frame(kind: CloseKind) -> CloseFrame<'static> {
    match kind {
        CloseKind::ProtocolViolation(reason) => CloseFrame {
            code: CloseCode::Invalid,
            reason: reason.into(),
        },
        CloseKind::GoingAway => CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.ports(), vec![DEFAULT_PORT, FALLBACK_PORT]);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"name": "Tracker", "fallback_port": null}"#).unwrap();
        assert_eq!(config.name, "Tracker");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ports(), vec![DEFAULT_PORT]);
    }

    #[test]
    fn test_close_frames() {
        let frame = close_frame(CloseKind::ProtocolViolation("bad".into()));
        assert_eq!(frame.code, CloseCode::Invalid);
        assert_eq!(frame.reason, "bad");

        let frame = close_frame(CloseKind::GoingAway);
        assert_eq!(frame.code, CloseCode::Away);
        assert!(frame.reason.is_empty());
    }

    #[tokio::test]
    async fn test_handle_without_listener() {
        let handle = ServerHandle::from_context(ServerContext::new("Embedded", "0"));
        handle.set_slots(["B", "A"]).await;
        assert_eq!(handle.set_vars([Var::new("A", "x", 1)]).await, 1);
        assert_eq!(handle.slots().await, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(handle.session_count().await, 0);
    }
}
