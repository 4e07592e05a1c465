//! Session-managed protocol gateway.
//!
//! - `manager.rs` - session map: resolve-or-create, dispatch, terminate, idle sweep
//! - `transport.rs` - per-session HTTP framing (JSON or SSE) and the standalone stream
//! - `engine.rs` - per-session JSON-RPC method dispatch
//! - `error.rs` - session failures, mapped to HTTP statuses by the gateway

mod engine;
mod error;
mod manager;
mod transport;

pub use engine::{
    ClientInfo, LogLevel, NotificationSink, ProtocolEngine, SUPPORTED_PROTOCOL_VERSIONS,
    ServerIdentity,
};
pub use error::SessionError;
pub use manager::{EngineFactory, Inbound, Resolved, Session, SessionManager};
pub use transport::{AbortOnDrop, ResponseMode, SessionTransport, TransportState};
