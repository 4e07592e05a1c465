//! Error types and handling for the MCP gateway.
//!
//! This module defines a unified error type that can represent errors from
//! all subsystems, providing consistent error handling at the process
//! boundary. Request-scoped failures keep their own typed errors
//! (`AuthError`, `SessionError`, `FetchError`, `ToolError`) and are only
//! folded into this type when they escape to startup or shutdown code.

use thiserror::Error;

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the MCP gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the tools domain.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Error originating from the transport layer.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Error originating from token verification.
    #[error("Authentication error: {0}")]
    Auth(#[from] super::auth::AuthError),

    /// Error originating from the upstream data provider.
    #[error("Upstream error: {0}")]
    Upstream(#[from] super::upstream::FetchError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors that should not occur under normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
