//! Place name search tool.
//!
//! Lets clients see which places a name resolves to before asking for
//! weather at one of them.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::search_places;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

/// Parameters for place search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GeocodeParams {
    /// Place name to search for.
    #[schemars(description = "Place name to search for, e.g. \"Springfield\"")]
    pub name: String,

    /// Maximum number of matches (default: 5, max: 10).
    #[schemars(
        description = "Maximum number of matches (default: 5, max: 10)",
        range(min = 1, max = 10)
    )]
    #[serde(default = "default_count")]
    pub count: u8,
}

fn default_count() -> u8 {
    5
}

impl Validate for GeocodeParams {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !(1..=10).contains(&self.count) {
            return Err(format!("count must be between 1 and 10, got {}", self.count));
        }
        Ok(())
    }
}

/// Geocoding tool implementation.
#[derive(Debug, Clone)]
pub struct GeocodeLocationTool;

impl ToolDefinition for GeocodeLocationTool {
    const NAME: &'static str = "geocode_location";
    const DESCRIPTION: &'static str = "Search for places by name and return their coordinates, region, country, timezone and elevation. Use this to disambiguate a place before requesting weather data.";
    const CATEGORY: &'static str = "location";
    const TAGS: &'static [&'static str] = &["geocoding", "search", "coordinates"];

    type Params = GeocodeParams;

    async fn run(ctx: &ToolContext, params: GeocodeParams) -> Result<String, ToolError> {
        let places = search_places(ctx, &params.name, params.count).await?;
        if places.is_empty() {
            return Err(ToolError::NoMatch(params.name.trim().to_string()));
        }

        let mut out = format!(
            "Found {} place(s) matching '{}':\n",
            places.len(),
            params.name.trim()
        );
        for (i, place) in places.iter().enumerate() {
            let _ = writeln!(out, "\n{}. {}", i + 1, place.label());
            let _ = writeln!(
                out,
                "   Coordinates: {:.4}, {:.4}",
                place.latitude, place.longitude
            );
            if let Some(tz) = &place.timezone {
                let _ = writeln!(out, "   Timezone: {tz}");
            }
            if let Some(elevation) = place.elevation {
                let _ = writeln!(out, "   Elevation: {elevation:.0} m");
            }
            if let Some(population) = place.population {
                let _ = writeln!(out, "   Population: {population}");
            }
        }
        Ok(out)
    }
}
