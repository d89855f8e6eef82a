//! UAT Server - WebSocket server for the UAT variable-sync protocol
//!
//! This crate implements the server side of the UAT protocol. The
//! embedding application declares slots and pushes variable values; the
//! server keeps the authoritative state and notifies every connected
//! client of the values that actually changed.
//!
//! The server supports:
//! - Multiple concurrent connections
//! - A one-shot `Info` handshake on connect
//! - `Sync` requests for a whole slot or every variable
//! - Structured `ErrorReply` entries for rejected commands
//!
//! ```no_run
//! use uat_server::{ServerConfig, UatServer};
//! use uat_core::Var;
//!
//! # async fn demo() -> Result<(), uat_server::ServerError> {
//! let mut server = UatServer::new(ServerConfig::default());
//! let handle = server.handle();
//! handle.set_slots(["Player 1"]).await;
//! server.start().await?;
//!
//! handle.set_vars([Var::new("Player 1", "hp", 10)]).await;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod handlers;
mod processor;
mod protocol;
mod registry;
mod server;
mod validator;

pub use context::ServerContext;
pub use error::{CommandError, ErrorReason, ProtocolError, ServerError};
pub use processor::{process_message, CommandOutcome};
pub use protocol::{Command, InfoPayload, ServerMessage, PROTOCOL_VERSION};
pub use registry::{CloseKind, Outbound, Session, SessionId, SessionInfo, SessionRegistry};
pub use server::{
    ServerConfig, ServerHandle, SharedState, UatServer, CLOSE_TIMEOUT, DEFAULT_PORT, FALLBACK_PORT,
};
pub use validator::{CommandValidator, FieldRule, FieldType, IssueKind, ValidationIssue};
