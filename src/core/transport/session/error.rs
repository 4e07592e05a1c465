//! Session error types.

use thiserror::Error;

/// Reasons a request cannot be served by a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No live session has this id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session was terminated while the request was being handled.
    #[error("Session closed: {0}")]
    Closed(String),

    /// GET and DELETE must name a session.
    #[error("Missing Mcp-Session-Id header")]
    MissingSessionId,

    /// A transport can be bound to an engine only once.
    #[error("Session transport already connected")]
    AlreadyConnected,

    /// A standalone stream is already open for this session.
    #[error("A stream is already open for this session")]
    StreamConflict,

    /// The client does not accept the required media type.
    #[error("Not acceptable: client must accept {0}")]
    NotAcceptable(&'static str),

    /// The body is not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The body is JSON but not an acceptable JSON-RPC payload.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Dispatch failed before anything was written.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Create a "not found" error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
