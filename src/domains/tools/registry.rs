//! Tool Registry - central registration for all tools.
//!
//! This module provides:
//! - The catalog of available tools, each bound to a shared [`ToolContext`]
//! - Bulk registration onto a per-session protocol engine
//! - The static tool manifest served at `GET /tools`

use rmcp::model::Tool;
use serde::Serialize;
use std::sync::Arc;

use crate::core::transport::session::{EngineFactory, ProtocolEngine, ServerIdentity};

use super::context::ToolContext;
use super::definitions::{
    AirQualityTool, CurrentWeatherTool, FireRiskTool, GeocodeLocationTool, MarineConditionsTool,
    SoilConditionsTool, WeatherForecastTool,
};
use super::handlers::ToolEntry;

/// Manifest line for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
    pub category: &'static str,
    pub tags: &'static [&'static str],
}

/// Tool registry - manages all available tools.
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl ToolRegistry {
    /// Create the registry with the full tool catalog.
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            entries: vec![
                ToolEntry::of::<GeocodeLocationTool>(ctx.clone()),
                ToolEntry::of::<CurrentWeatherTool>(ctx.clone()),
                ToolEntry::of::<WeatherForecastTool>(ctx.clone()),
                ToolEntry::of::<AirQualityTool>(ctx.clone()),
                ToolEntry::of::<MarineConditionsTool>(ctx.clone()),
                ToolEntry::of::<SoilConditionsTool>(ctx.clone()),
                ToolEntry::of::<FireRiskTool>(ctx),
            ],
        }
    }

    /// Registered entries, in catalog order.
    pub fn entries(&self) -> &[ToolEntry] {
        &self.entries
    }

    /// Get all tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.entries.iter().map(ToolEntry::name).collect()
    }

    /// Get all tools as Tool models (metadata).
    pub fn get_all_tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    /// Bind every tool onto `engine`. Safe to run once per session.
    pub fn register_all(&self, engine: &mut ProtocolEngine) {
        for entry in &self.entries {
            engine.register_tool(entry.clone());
        }
    }

    /// Session-independent summary of the catalog.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.entries
            .iter()
            .map(|entry| ManifestEntry {
                name: entry.name().to_string(),
                description: entry.description().to_string(),
                category: entry.category,
                tags: entry.tags,
            })
            .collect()
    }
}

/// Builds per-session engines with every registered tool.
pub struct RegistryEngineFactory {
    registry: Arc<ToolRegistry>,
    identity: ServerIdentity,
}

impl RegistryEngineFactory {
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        Self { registry, identity }
    }
}

impl EngineFactory for RegistryEngineFactory {
    fn create_engine(&self, _session_id: &str) -> ProtocolEngine {
        let mut engine = ProtocolEngine::new(self.identity.clone());
        self.registry.register_all(&mut engine);
        engine
    }
}
