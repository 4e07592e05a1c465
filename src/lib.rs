//! Weather MCP Gateway Library
//!
//! A Model Context Protocol (MCP) gateway that serves weather, environment
//! and risk assessment tools over Streamable HTTP, with per-client sessions
//! and bearer token authentication.
//!
//! # Architecture
//!
//! - **core**: Infrastructure
//!   - **config**: `MCP_*` environment configuration, validated eagerly
//!   - **auth**: JWT verification against the identity provider's JWKS
//!   - **upstream**: Cached, deduplicating client for the weather provider
//!   - **transport**: HTTP gateway (sessions, JSON-RPC, OAuth relay) and STDIO
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: MCP tools that can be executed by clients
//!
//! # Example
//!
//! ```rust,no_run
//! use weather_mcp_gateway::core::{Config, TransportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     TransportService::new(config).run().await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
