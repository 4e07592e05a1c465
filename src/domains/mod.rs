//! Domains module containing business logic organized by bounded contexts.
//!
//! Each subdomain represents a specific area of functionality exposed to MCP
//! clients. The gateway currently exposes a single domain: weather tools.

pub mod tools;
