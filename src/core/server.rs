//! MCP Server implementation for the STDIO transport.
//!
//! The HTTP gateway runs its own per-session protocol engine; over STDIO
//! there is exactly one client, so rmcp drives the protocol and this handler
//! only supplies server info and the tool router.
//!
//! The ToolRouter is built from the same [`ToolRegistry`] the gateway uses.
//! **Adding a new tool does NOT require modifying this file!**

use rmcp::{ServerHandler, handler::server::tool::ToolRouter, model::*, tool_handler};
use std::sync::Arc;

use super::transport::session::ServerIdentity;
use crate::domains::tools::{ToolRegistry, build_tool_router};

/// Instructions reported to clients during `initialize`.
pub const SERVER_INSTRUCTIONS: &str = "Weather data tools backed by Open-Meteo. Locations can be given as a place name or as latitude/longitude. Use geocode_location to disambiguate place names before requesting weather.";

/// The main MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    identity: Arc<ServerIdentity>,

    /// Tool router for handling tool calls.
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    /// Create a server exposing every tool in `registry`.
    pub fn new(registry: &ToolRegistry, identity: ServerIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
            tool_router: build_tool_router::<Self>(registry),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.identity.version
    }

    /// Names of the routed tools.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect()
    }
}

/// ServerHandler implementation with tool_handler macro for automatic tool routing.
#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo {
            instructions: self.identity.instructions.clone(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        };
        info.server_info.name = self.identity.name.clone();
        info.server_info.version = self.identity.version.clone();
        info
    }
}
