//! Current conditions tool.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, compass_direction, coordinate_query, decode,
    describe_optional_code, fmt_value, report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,precipitation,weather_code,cloud_cover,wind_speed_10m,wind_direction_10m,wind_gusts_10m,is_day";

/// Parameters for current conditions.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CurrentWeatherParams {
    #[serde(flatten)]
    pub location: LocationParams,
}

impl Validate for CurrentWeatherParams {
    fn validate(&self) -> Result<(), String> {
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    #[serde(default)]
    time: Option<String>,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    precipitation: Option<f64>,
    weather_code: Option<f64>,
    cloud_cover: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
    wind_gusts_10m: Option<f64>,
    #[serde(default)]
    is_day: Option<u8>,
}

/// Comfort assessment for a felt temperature in °C.
pub fn comfort_level(feels_like: f64) -> &'static str {
    match feels_like {
        t if t < -10.0 => "Dangerously cold: limit time outdoors, frostbite risk",
        t if t < 0.0 => "Very cold: heavy winter clothing needed",
        t if t < 10.0 => "Cold: wear a warm coat",
        t if t < 18.0 => "Cool: a light jacket is advisable",
        t if t < 26.0 => "Comfortable",
        t if t < 32.0 => "Warm: stay hydrated",
        t if t < 39.0 => "Hot: limit strenuous activity",
        _ => "Dangerously hot: heat illness risk, avoid exertion",
    }
}

/// Current weather tool implementation.
#[derive(Debug, Clone)]
pub struct CurrentWeatherTool;

impl CurrentWeatherTool {
    fn render(location: &ResolvedLocation, current: &Current) -> String {
        let mut out = report_header("Current weather", location);
        if let Some(time) = &current.time {
            let _ = writeln!(out, "Observed: {time} (local time)");
        }
        let _ = writeln!(
            out,
            "Conditions: {}{}",
            describe_optional_code(current.weather_code),
            match current.is_day {
                Some(0) => " (night)",
                _ => "",
            }
        );
        let _ = writeln!(out, "Temperature: {}", fmt_value(current.temperature_2m, "°C"));
        let _ = writeln!(out, "Feels like: {}", fmt_value(current.apparent_temperature, "°C"));
        let _ = writeln!(out, "Humidity: {}", fmt_value(current.relative_humidity_2m, "%"));
        let _ = writeln!(out, "Cloud cover: {}", fmt_value(current.cloud_cover, "%"));
        let _ = writeln!(out, "Precipitation: {}", fmt_value(current.precipitation, "mm"));

        let direction = current
            .wind_direction_10m
            .map(|d| format!(" from {}", compass_direction(d)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "Wind: {}{direction}, gusts {}",
            fmt_value(current.wind_speed_10m, "km/h"),
            fmt_value(current.wind_gusts_10m, "km/h")
        );

        if let Some(feels) = current.apparent_temperature.or(current.temperature_2m) {
            let _ = writeln!(out, "\nComfort: {}", comfort_level(feels));
        }
        out
    }
}

impl ToolDefinition for CurrentWeatherTool {
    const NAME: &'static str = "get_current_weather";
    const DESCRIPTION: &'static str = "Get current weather conditions for a place name or coordinates: temperature, feels-like temperature, humidity, cloud cover, precipitation and wind, plus a comfort assessment.";
    const CATEGORY: &'static str = "weather";
    const TAGS: &'static [&'static str] = &["weather", "current", "temperature", "wind"];

    type Params = CurrentWeatherParams;

    async fn run(ctx: &ToolContext, params: CurrentWeatherParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("current", CURRENT_FIELDS.to_string()));
        let url = build_url(&ctx.endpoints.forecast_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Realtime).await?;
        let response: CurrentResponse = decode(body)?;
        Ok(Self::render(&location, &response.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::common::tests::fake_context;
    use crate::test_support::spawn_server;
    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;

    #[test]
    fn test_comfort_thresholds() {
        assert!(comfort_level(-10.1).starts_with("Dangerously cold"));
        assert!(comfort_level(-10.0).starts_with("Very cold"));
        assert!(comfort_level(0.0).starts_with("Cold"));
        assert!(comfort_level(10.0).starts_with("Cool"));
        assert_eq!(comfort_level(18.0), "Comfortable");
        assert_eq!(comfort_level(25.9), "Comfortable");
        assert!(comfort_level(26.0).starts_with("Warm"));
        assert!(comfort_level(32.0).starts_with("Hot"));
        assert!(comfort_level(39.0).starts_with("Dangerously hot"));
    }

    fn coords() -> CurrentWeatherParams {
        CurrentWeatherParams {
            location: LocationParams {
                location: None,
                latitude: Some(52.52),
                longitude: Some(13.41),
            },
        }
    }

    #[tokio::test]
    async fn test_renders_current_conditions() {
        let router = Router::new().route(
            "/v1/forecast",
            get(|| async {
                Json(json!({
                    "latitude": 52.52,
                    "longitude": 13.41,
                    "current": {
                        "time": "2025-06-01T14:00",
                        "temperature_2m": 21.4,
                        "relative_humidity_2m": 48,
                        "apparent_temperature": 20.9,
                        "precipitation": 0.0,
                        "weather_code": 2,
                        "cloud_cover": 40,
                        "wind_speed_10m": 12.2,
                        "wind_direction_10m": 270,
                        "wind_gusts_10m": 25.0,
                        "is_day": 1
                    }
                }))
            }),
        );
        let server = spawn_server(router).await;
        let ctx = fake_context(&server);

        let report = CurrentWeatherTool::run(&ctx, coords()).await.unwrap();
        assert!(report.contains("Current weather for 52.5200, 13.4100"));
        assert!(report.contains("Conditions: Partly cloudy"));
        assert!(report.contains("Temperature: 21.4 °C"));
        assert!(report.contains("Wind: 12.2 km/h from W"));
        assert!(report.contains("Comfort: Comfortable"));
    }

    #[tokio::test]
    async fn test_upstream_failure_names_status() {
        let router = Router::new().route(
            "/v1/forecast",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let server = spawn_server(router).await;
        let ctx = fake_context(&server);

        let err = CurrentWeatherTool::run(&ctx, coords()).await.unwrap_err();
        assert!(matches!(err, ToolError::Upstream(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_missing_current_block_is_unexpected_data() {
        let router = Router::new().route("/v1/forecast", get(|| async { Json(json!({})) }));
        let server = spawn_server(router).await;
        let ctx = fake_context(&server);

        let err = CurrentWeatherTool::run(&ctx, coords()).await.unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedData(_)));
    }
}
