//! Daily forecast tool.
//!
//! Produces one line per day with the day's extremes and precipitation,
//! followed by any alerts the day's values trigger.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, coordinate_query, decode,
    describe_optional_code, fmt_value, report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum,precipitation_probability_max,wind_speed_10m_max,uv_index_max";

const MAX_DAYS: u8 = 16;

/// Parameters for the daily forecast.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ForecastParams {
    #[serde(flatten)]
    pub location: LocationParams,

    /// Number of days to forecast (default: 7, max: 16).
    #[schemars(
        description = "Number of days to forecast (default: 7, max: 16)",
        range(min = 1, max = 16)
    )]
    #[serde(default = "default_days")]
    pub days: u8,
}

fn default_days() -> u8 {
    7
}

impl Validate for ForecastParams {
    fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_DAYS).contains(&self.days) {
            return Err(format!("days must be between 1 and {MAX_DAYS}, got {}", self.days));
        }
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Daily,
}

#[derive(Debug, Default, Deserialize)]
struct Daily {
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    uv_index_max: Vec<Option<f64>>,
}

/// One day of forecast values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayForecast {
    pub date: String,
    pub weather_code: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub wind_max: Option<f64>,
    pub uv_max: Option<f64>,
}

fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten()
}

impl Daily {
    fn days(&self) -> Vec<DayForecast> {
        self.time
            .iter()
            .enumerate()
            .map(|(i, date)| DayForecast {
                date: date.clone(),
                weather_code: at(&self.weather_code, i),
                temp_max: at(&self.temperature_2m_max, i),
                temp_min: at(&self.temperature_2m_min, i),
                precipitation: at(&self.precipitation_sum, i),
                precipitation_probability: at(&self.precipitation_probability_max, i),
                wind_max: at(&self.wind_speed_10m_max, i),
                uv_max: at(&self.uv_index_max, i),
            })
            .collect()
    }
}

/// Alerts triggered by one day's values.
pub fn day_alerts(day: &DayForecast) -> Vec<&'static str> {
    let mut alerts = Vec::new();
    if day.temp_max.is_some_and(|t| t >= 35.0) {
        alerts.push("Extreme heat");
    }
    if day.temp_min.is_some_and(|t| t <= -15.0) {
        alerts.push("Extreme cold");
    }
    if day.precipitation.is_some_and(|p| p >= 30.0) {
        alerts.push("Heavy precipitation");
    }
    if day.wind_max.is_some_and(|w| w >= 60.0) {
        alerts.push("High winds");
    }
    if day.uv_max.is_some_and(|uv| uv >= 8.0) {
        alerts.push("Very high UV");
    }
    alerts
}

/// Daily forecast tool implementation.
#[derive(Debug, Clone)]
pub struct WeatherForecastTool;

impl WeatherForecastTool {
    fn render(location: &ResolvedLocation, days: &[DayForecast]) -> String {
        let mut out = report_header(&format!("{}-day forecast", days.len()), location);
        for day in days {
            let _ = writeln!(
                out,
                "\n{}: {}, high {}, low {}",
                day.date,
                describe_optional_code(day.weather_code),
                fmt_value(day.temp_max, "°C"),
                fmt_value(day.temp_min, "°C"),
            );
            let _ = writeln!(
                out,
                "  Precipitation: {} ({} chance), max wind {}, UV index {}",
                fmt_value(day.precipitation, "mm"),
                fmt_value(day.precipitation_probability, "%"),
                fmt_value(day.wind_max, "km/h"),
                fmt_value(day.uv_max, ""),
            );
            let alerts = day_alerts(day);
            if !alerts.is_empty() {
                let _ = writeln!(out, "  Alerts: {}", alerts.join(", "));
            }
        }
        out
    }
}

impl ToolDefinition for WeatherForecastTool {
    const NAME: &'static str = "get_weather_forecast";
    const DESCRIPTION: &'static str = "Get a daily weather forecast (1 to 16 days) for a place name or coordinates: conditions, high and low temperatures, precipitation, wind and UV index, with alerts for extreme heat, extreme cold, heavy precipitation, high winds and very high UV.";
    const CATEGORY: &'static str = "weather";
    const TAGS: &'static [&'static str] = &["weather", "forecast", "daily", "alerts"];

    type Params = ForecastParams;

    async fn run(ctx: &ToolContext, params: ForecastParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("daily", DAILY_FIELDS.to_string()));
        query.push(("forecast_days", params.days.to_string()));
        let url = build_url(&ctx.endpoints.forecast_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Forecast).await?;
        let response: ForecastResponse = decode(body)?;
        let days = response.daily.days();
        if days.is_empty() {
            return Err(ToolError::unexpected_data("forecast contained no days"));
        }
        Ok(Self::render(&location, &days))
    }
}
