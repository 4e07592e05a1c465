//! Transport layer for the MCP server.
//!
//! This module provides two transports:
//! - **HTTP**: Streamable HTTP gateway with per-client sessions, bearer
//!   token authentication and an OAuth relay (always built)
//! - **STDIO**: Standard input/output for clients that launch the server as
//!   a subprocess - feature: `stdio`
//!
//! Supporting modules:
//! - `jsonrpc` - JSON-RPC 2.0 envelopes and error codes
//! - `session` - session manager, per-session transport and protocol engine
//! - `oauth` - discovery metadata and identity provider proxy

mod config;
mod error;
mod service;

pub mod http;
pub mod jsonrpc;
pub mod oauth;
pub mod session;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::{HttpConfig, SessionConfig, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use service::TransportService;
