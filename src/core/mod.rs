//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the MCP gateway:
//! configuration, error handling, authentication, upstream data access, the
//! STDIO server handler and the transport layer.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use server::McpServer;
pub use transport::{TransportConfig, TransportService};
