//! Soil conditions tool.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, coordinate_query, decode, fmt_value,
    report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const CURRENT_FIELDS: &str = "soil_temperature_0cm,soil_temperature_6cm,soil_temperature_18cm,soil_moisture_0_to_1cm,soil_moisture_3_to_9cm,soil_moisture_9_to_27cm";

/// Parameters for soil conditions.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SoilParams {
    #[serde(flatten)]
    pub location: LocationParams,
}

impl Validate for SoilParams {
    fn validate(&self) -> Result<(), String> {
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct SoilResponse {
    current: Soil,
}

#[derive(Debug, Deserialize)]
struct Soil {
    soil_temperature_0cm: Option<f64>,
    soil_temperature_6cm: Option<f64>,
    soil_temperature_18cm: Option<f64>,
    soil_moisture_0_to_1cm: Option<f64>,
    soil_moisture_3_to_9cm: Option<f64>,
    soil_moisture_9_to_27cm: Option<f64>,
}

/// Planting suitability for a root-zone soil temperature in °C.
pub fn planting_suitability(soil_temp: f64) -> &'static str {
    match soil_temp {
        t if t < 5.0 => "Too cold for planting: most seeds will not germinate",
        t if t < 10.0 => "Cool: suitable for cold-hardy crops such as peas, spinach and lettuce",
        t if t <= 30.0 => "Warm: suitable for most crops",
        _ => "Too hot: seedlings risk heat stress, plant in the cooler part of the day",
    }
}

/// Moisture class for volumetric soil water content (m³/m³).
pub fn moisture_level(moisture: f64) -> &'static str {
    if moisture < 0.1 {
        "Dry: irrigation recommended"
    } else if moisture > 0.4 {
        "Waterlogged: delay planting and heavy machinery"
    } else {
        "Adequate"
    }
}

/// Soil conditions tool implementation.
#[derive(Debug, Clone)]
pub struct SoilConditionsTool;

impl SoilConditionsTool {
    fn render(location: &ResolvedLocation, soil: &Soil) -> String {
        let mut out = report_header("Soil conditions", location);
        let _ = writeln!(out, "Temperature:");
        let _ = writeln!(out, "  Surface: {}", fmt_value(soil.soil_temperature_0cm, "°C"));
        let _ = writeln!(out, "  6 cm: {}", fmt_value(soil.soil_temperature_6cm, "°C"));
        let _ = writeln!(out, "  18 cm: {}", fmt_value(soil.soil_temperature_18cm, "°C"));
        let _ = writeln!(out, "Moisture (m³/m³):");
        let _ = writeln!(out, "  0-1 cm: {}", fmt_moisture(soil.soil_moisture_0_to_1cm));
        let _ = writeln!(out, "  3-9 cm: {}", fmt_moisture(soil.soil_moisture_3_to_9cm));
        let _ = writeln!(out, "  9-27 cm: {}", fmt_moisture(soil.soil_moisture_9_to_27cm));

        let _ = writeln!(out);
        if let Some(temp) = soil.soil_temperature_6cm.or(soil.soil_temperature_0cm) {
            let _ = writeln!(out, "Planting: {}", planting_suitability(temp));
        }
        if let Some(moisture) = soil.soil_moisture_3_to_9cm.or(soil.soil_moisture_0_to_1cm) {
            let _ = writeln!(out, "Moisture: {}", moisture_level(moisture));
        }
        out
    }
}

fn fmt_moisture(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "n/a".to_string())
}

impl ToolDefinition for SoilConditionsTool {
    const NAME: &'static str = "get_soil_conditions";
    const DESCRIPTION: &'static str = "Get current soil temperature and moisture at several depths for a place name or coordinates, with a planting suitability and soil moisture assessment.";
    const CATEGORY: &'static str = "agriculture";
    const TAGS: &'static [&'static str] = &["soil", "agriculture", "planting", "moisture"];

    type Params = SoilParams;

    async fn run(ctx: &ToolContext, params: SoilParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("current", CURRENT_FIELDS.to_string()));
        let url = build_url(&ctx.endpoints.forecast_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Realtime).await?;
        let response: SoilResponse = decode(body)?;
        Ok(Self::render(&location, &response.current))
    }
}
