//! Marine conditions tool.
//!
//! Inland coordinates come back from the provider with null wave data; that
//! is reported as a failed result rather than a table of "n/a".

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, compass_direction, coordinate_query, decode,
    fmt_value, report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const CURRENT_FIELDS: &str = "wave_height,wave_direction,wave_period,wind_wave_height,swell_wave_height,swell_wave_direction,swell_wave_period";

/// Parameters for marine conditions.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MarineParams {
    #[serde(flatten)]
    pub location: LocationParams,
}

impl Validate for MarineParams {
    fn validate(&self) -> Result<(), String> {
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct MarineResponse {
    #[serde(default)]
    current: Option<Marine>,
}

#[derive(Debug, Deserialize)]
struct Marine {
    wave_height: Option<f64>,
    wave_direction: Option<f64>,
    wave_period: Option<f64>,
    wind_wave_height: Option<f64>,
    swell_wave_height: Option<f64>,
    swell_wave_direction: Option<f64>,
    swell_wave_period: Option<f64>,
}

/// Sea state and boating suitability for a significant wave height in metres.
pub fn sea_state(wave_height: f64) -> (&'static str, &'static str) {
    match wave_height {
        h if h < 0.5 => ("Calm", "Excellent for all boating"),
        h if h < 1.25 => ("Slight", "Good for most boats"),
        h if h < 2.5 => ("Moderate", "Caution advised for small craft"),
        h if h < 4.0 => ("Rough", "Experienced boaters and larger vessels only"),
        _ => ("Very rough", "Dangerous: avoid going out"),
    }
}

/// Marine conditions tool implementation.
#[derive(Debug, Clone)]
pub struct MarineConditionsTool;

impl MarineConditionsTool {
    fn render(location: &ResolvedLocation, marine: &Marine, wave_height: f64) -> String {
        let (state, suitability) = sea_state(wave_height);
        let mut out = report_header("Marine conditions", location);

        let direction = |d: Option<f64>| {
            d.map(|d| format!(" from {}", compass_direction(d)))
                .unwrap_or_default()
        };
        let _ = writeln!(
            out,
            "Waves: {}{}, period {}",
            fmt_value(Some(wave_height), "m"),
            direction(marine.wave_direction),
            fmt_value(marine.wave_period, "s")
        );
        let _ = writeln!(out, "Wind waves: {}", fmt_value(marine.wind_wave_height, "m"));
        let _ = writeln!(
            out,
            "Swell: {}{}, period {}",
            fmt_value(marine.swell_wave_height, "m"),
            direction(marine.swell_wave_direction),
            fmt_value(marine.swell_wave_period, "s")
        );
        let _ = writeln!(out, "\nSea state: {state}");
        let _ = writeln!(out, "Boating: {suitability}");
        out
    }
}

impl ToolDefinition for MarineConditionsTool {
    const NAME: &'static str = "get_marine_conditions";
    const DESCRIPTION: &'static str = "Get current marine conditions for a coastal or offshore place name or coordinates: wave height, direction and period, wind waves and swell, with a sea state and boating suitability assessment.";
    const CATEGORY: &'static str = "marine";
    const TAGS: &'static [&'static str] = &["marine", "waves", "swell", "boating"];

    type Params = MarineParams;

    async fn run(ctx: &ToolContext, params: MarineParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("current", CURRENT_FIELDS.to_string()));
        let url = build_url(&ctx.endpoints.marine_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Realtime).await?;
        let response: MarineResponse = decode(body)?;

        let Some(marine) = response.current else {
            return Err(no_marine_data(&location));
        };
        let Some(wave_height) = marine.wave_height else {
            return Err(no_marine_data(&location));
        };
        Ok(Self::render(&location, &marine, wave_height))
    }
}

fn no_marine_data(location: &ResolvedLocation) -> ToolError {
    ToolError::Unavailable(format!(
        "No marine data is available for {}. The location is probably inland; try a coastal or offshore point.",
        location.label
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::common::tests::fake_context;
    use crate::test_support::spawn_server;
    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};

    #[test]
    fn test_sea_state_thresholds() {
        assert_eq!(sea_state(0.49).0, "Calm");
        assert_eq!(sea_state(0.5).0, "Slight");
        assert_eq!(sea_state(1.25).0, "Moderate");
        assert_eq!(sea_state(2.5).0, "Rough");
        assert_eq!(sea_state(4.0).0, "Very rough");
    }

    fn params() -> MarineParams {
        MarineParams {
            location: LocationParams {
                location: None,
                latitude: Some(43.3),
                longitude: Some(-2.0),
            },
        }
    }

    async fn run_against(payload: Value) -> Result<String, ToolError> {
        let router = Router::new().route(
            "/v1/marine",
            get(move || {
                let payload = payload.clone();
                async move { Json(payload) }
            }),
        );
        let server = spawn_server(router).await;
        let ctx = fake_context(&server);
        MarineConditionsTool::run(&ctx, params()).await
    }

    #[tokio::test]
    async fn test_renders_waves_and_suitability() {
        let report = run_against(json!({
            "current": {
                "wave_height": 1.8,
                "wave_direction": 315,
                "wave_period": 9.5,
                "wind_wave_height": 0.6,
                "swell_wave_height": 1.6,
                "swell_wave_direction": 300,
                "swell_wave_period": 11.0
            }
        }))
        .await
        .unwrap();

        assert!(report.contains("Waves: 1.8 m from NW, period 9.5 s"));
        assert!(report.contains("Sea state: Moderate"));
        assert!(report.contains("Caution advised for small craft"));
    }

    #[tokio::test]
    async fn test_null_waves_mean_inland() {
        let err = run_against(json!({"current": {"wave_height": null}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
        assert!(err.to_string().contains("inland"));
    }
}
