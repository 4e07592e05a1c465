//! Air quality tool.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, coordinate_query, decode, fmt_value,
    report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const CURRENT_FIELDS: &str =
    "us_aqi,pm2_5,pm10,ozone,nitrogen_dioxide,sulphur_dioxide,carbon_monoxide";

/// Parameters for air quality.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AirQualityParams {
    #[serde(flatten)]
    pub location: LocationParams,
}

impl Validate for AirQualityParams {
    fn validate(&self) -> Result<(), String> {
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: AirQuality,
}

#[derive(Debug, Deserialize)]
struct AirQuality {
    us_aqi: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    ozone: Option<f64>,
    nitrogen_dioxide: Option<f64>,
    sulphur_dioxide: Option<f64>,
    carbon_monoxide: Option<f64>,
}

/// US AQI category and the matching health guidance.
pub fn aqi_category(aqi: f64) -> (&'static str, &'static str) {
    match aqi {
        a if a <= 50.0 => ("Good", "Air quality is satisfactory for everyone."),
        a if a <= 100.0 => (
            "Moderate",
            "Unusually sensitive people should consider limiting prolonged outdoor exertion.",
        ),
        a if a <= 150.0 => (
            "Unhealthy for Sensitive Groups",
            "Children, older adults and people with heart or lung disease should reduce prolonged outdoor exertion.",
        ),
        a if a <= 200.0 => (
            "Unhealthy",
            "Everyone should reduce prolonged outdoor exertion; sensitive groups should avoid it.",
        ),
        a if a <= 300.0 => (
            "Very Unhealthy",
            "Everyone should avoid prolonged outdoor exertion.",
        ),
        _ => (
            "Hazardous",
            "Health warning of emergency conditions: everyone should stay indoors.",
        ),
    }
}

/// Air quality tool implementation.
#[derive(Debug, Clone)]
pub struct AirQualityTool;

impl AirQualityTool {
    fn render(location: &ResolvedLocation, air: &AirQuality) -> String {
        let mut out = report_header("Air quality", location);
        match air.us_aqi {
            Some(aqi) => {
                let (category, advice) = aqi_category(aqi);
                let _ = writeln!(out, "US AQI: {aqi:.0} ({category})");
                let _ = writeln!(out, "Health: {advice}");
            }
            None => {
                let _ = writeln!(out, "US AQI: n/a");
            }
        }

        let _ = writeln!(out, "\nPollutants:");
        for (name, value) in [
            ("PM2.5", air.pm2_5),
            ("PM10", air.pm10),
            ("Ozone (O3)", air.ozone),
            ("Nitrogen dioxide (NO2)", air.nitrogen_dioxide),
            ("Sulphur dioxide (SO2)", air.sulphur_dioxide),
            ("Carbon monoxide (CO)", air.carbon_monoxide),
        ] {
            let _ = writeln!(out, "  {name}: {}", fmt_value(value, "µg/m³"));
        }
        out
    }
}

impl ToolDefinition for AirQualityTool {
    const NAME: &'static str = "get_air_quality";
    const DESCRIPTION: &'static str = "Get current air quality for a place name or coordinates: US Air Quality Index with its health category and guidance, plus PM2.5, PM10, ozone, nitrogen dioxide, sulphur dioxide and carbon monoxide concentrations.";
    const CATEGORY: &'static str = "environment";
    const TAGS: &'static [&'static str] = &["air quality", "aqi", "pollution", "health"];

    type Params = AirQualityParams;

    async fn run(ctx: &ToolContext, params: AirQualityParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("current", CURRENT_FIELDS.to_string()));
        let url = build_url(&ctx.endpoints.air_quality_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Realtime).await?;
        let response: AirQualityResponse = decode(body)?;
        Ok(Self::render(&location, &response.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::common::tests::fake_context;
    use crate::test_support::spawn_server;
    use axum::{Json, Router, routing::get};
    use serde_json::json;

    #[test]
    fn test_aqi_category_boundaries() {
        assert_eq!(aqi_category(0.0).0, "Good");
        assert_eq!(aqi_category(50.0).0, "Good");
        assert_eq!(aqi_category(51.0).0, "Moderate");
        assert_eq!(aqi_category(100.0).0, "Moderate");
        assert_eq!(aqi_category(101.0).0, "Unhealthy for Sensitive Groups");
        assert_eq!(aqi_category(151.0).0, "Unhealthy");
        assert_eq!(aqi_category(201.0).0, "Very Unhealthy");
        assert_eq!(aqi_category(300.0).0, "Very Unhealthy");
        assert_eq!(aqi_category(301.0).0, "Hazardous");
    }

    #[tokio::test]
    async fn test_renders_index_and_pollutants() {
        let router = Router::new().route(
            "/v1/air-quality",
            get(|| async {
                Json(json!({
                    "current": {
                        "time": "2025-06-01T14:00",
                        "us_aqi": 112,
                        "pm2_5": 40.2,
                        "pm10": 55.0,
                        "ozone": 80.5,
                        "nitrogen_dioxide": 21.3,
                        "sulphur_dioxide": null,
                        "carbon_monoxide": 230.0
                    }
                }))
            }),
        );
        let server = spawn_server(router).await;
        let ctx = fake_context(&server);
        let params = AirQualityParams {
            location: LocationParams {
                location: None,
                latitude: Some(28.61),
                longitude: Some(77.21),
            },
        };

        let report = AirQualityTool::run(&ctx, params).await.unwrap();
        assert!(report.contains("US AQI: 112 (Unhealthy for Sensitive Groups)"));
        assert!(report.contains("PM2.5: 40.2 µg/m³"));
        assert!(report.contains("Sulphur dioxide (SO2): n/a"));
    }
}
