//! Tools domain module.
//!
//! Tools are executable functions that MCP clients call to fetch and assess
//! weather data.
//!
//! ## Architecture
//!
//! - `definitions/` - Individual tool implementations (one file per tool)
//! - `handlers.rs` - `ToolDefinition` / `ToolHandler` contracts and `ToolEntry`
//! - `registry.rs` - The tool catalog, engine registration and manifest
//! - `router.rs` - rmcp ToolRouter builder for the STDIO transport
//! - `context.rs` - Upstream client and endpoints shared by all tools
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `definitions/` implementing `ToolDefinition`
//! 2. Export it in `definitions/mod.rs`
//! 3. Add `ToolEntry::of::<MyTool>(ctx)` to `ToolRegistry::new`
//!
//! Both transports pick the tool up from the registry.

mod context;
pub mod definitions;
mod error;
mod handlers;
mod registry;
pub mod router;

pub use context::ToolContext;
pub use error::ToolError;
pub use handlers::{ToolDefinition, ToolEntry, ToolHandler, Validate, parse_arguments};
pub use registry::{ManifestEntry, RegistryEngineFactory, ToolRegistry};
pub use router::build_tool_router;
