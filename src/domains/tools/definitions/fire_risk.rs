//! Fire weather risk tool.
//!
//! Scores four factors from 0 to 3 each (heat, dryness of the air, wind and
//! days since meaningful rain) and maps the total onto a risk level.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;

use super::common::{
    LocationParams, ResolvedLocation, build_url, coordinate_query, decode, fmt_value,
    report_header, resolve_location,
};
use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolDefinition, ToolError, Validate};

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m";
const LOOKBACK_DAYS: usize = 14;

/// Daily precipitation below this (mm) counts as a dry day.
const DRY_DAY_MM: f64 = 1.0;

/// Parameters for fire risk.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FireRiskParams {
    #[serde(flatten)]
    pub location: LocationParams,
}

impl Validate for FireRiskParams {
    fn validate(&self) -> Result<(), String> {
        self.location.validate()
    }
}

#[derive(Debug, Deserialize)]
struct FireWeatherResponse {
    current: FireWeather,
    daily: DailyPrecipitation,
}

#[derive(Debug, Deserialize)]
struct FireWeather {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyPrecipitation {
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

/// Fire risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=2 => Self::Low,
            3..=5 => Self::Moderate,
            6..=7 => Self::High,
            _ => Self::Extreme,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Extreme => "Extreme",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::Low => "Normal precautions apply.",
            Self::Moderate => "Be careful with open flames and outdoor equipment.",
            Self::High => "Avoid open fires and spark-producing work outdoors.",
            Self::Extreme => {
                "Fires can start and spread rapidly. Follow local fire bans and be ready to evacuate."
            }
        }
    }
}

fn temperature_points(t: f64) -> u8 {
    match t {
        t if t >= 35.0 => 3,
        t if t >= 30.0 => 2,
        t if t >= 25.0 => 1,
        _ => 0,
    }
}

fn humidity_points(rh: f64) -> u8 {
    match rh {
        h if h <= 15.0 => 3,
        h if h <= 25.0 => 2,
        h if h <= 40.0 => 1,
        _ => 0,
    }
}

fn wind_points(kmh: f64) -> u8 {
    match kmh {
        w if w >= 50.0 => 3,
        w if w >= 30.0 => 2,
        w if w >= 20.0 => 1,
        _ => 0,
    }
}

fn dry_day_points(days: usize) -> u8 {
    match days {
        d if d >= 14 => 3,
        d if d >= 7 => 2,
        d if d >= 3 => 1,
        _ => 0,
    }
}

/// Consecutive dry days, counted back from the last (most recent) entry.
///
/// A missing value ends the run.
pub fn dry_days(precipitation: &[Option<f64>]) -> usize {
    precipitation
        .iter()
        .rev()
        .take_while(|p| p.is_some_and(|mm| mm < DRY_DAY_MM))
        .count()
}

/// Per-factor scores and their total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireScore {
    pub temperature: u8,
    pub humidity: u8,
    pub wind: u8,
    pub dryness: u8,
}

impl FireScore {
    pub fn assess(temperature: f64, humidity: f64, wind: f64, dry_days: usize) -> Self {
        Self {
            temperature: temperature_points(temperature),
            humidity: humidity_points(humidity),
            wind: wind_points(wind),
            dryness: dry_day_points(dry_days),
        }
    }

    pub fn total(&self) -> u8 {
        self.temperature + self.humidity + self.wind + self.dryness
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.total())
    }
}

/// Fire risk tool implementation.
#[derive(Debug, Clone)]
pub struct FireRiskTool;

impl FireRiskTool {
    fn render(
        location: &ResolvedLocation,
        weather: &FireWeather,
        dry_days: usize,
        score: &FireScore,
    ) -> String {
        let level = score.level();
        let mut out = report_header("Fire weather risk", location);
        let _ = writeln!(out, "Risk level: {} (score {}/12)", level.as_str(), score.total());
        let _ = writeln!(out, "{}", level.advice());
        let _ = writeln!(out, "\nFactors:");
        let _ = writeln!(
            out,
            "  Temperature: {} ({} pts)",
            fmt_value(weather.temperature_2m, "°C"),
            score.temperature
        );
        let _ = writeln!(
            out,
            "  Humidity: {} ({} pts)",
            fmt_value(weather.relative_humidity_2m, "%"),
            score.humidity
        );
        let _ = writeln!(
            out,
            "  Wind: {} ({} pts)",
            fmt_value(weather.wind_speed_10m, "km/h"),
            score.wind
        );
        let lookback = if dry_days > LOOKBACK_DAYS {
            format!("more than {LOOKBACK_DAYS}")
        } else {
            dry_days.to_string()
        };
        let _ = writeln!(
            out,
            "  Days without rain: {lookback} ({} pts)",
            score.dryness
        );
        out
    }
}

impl ToolDefinition for FireRiskTool {
    const NAME: &'static str = "get_fire_risk";
    const DESCRIPTION: &'static str = "Assess current fire weather risk for a place name or coordinates from temperature, relative humidity, wind speed and the number of consecutive days without meaningful rain. Returns a risk level (Low, Moderate, High, Extreme) with the contributing factors.";
    const CATEGORY: &'static str = "safety";
    const TAGS: &'static [&'static str] = &["fire", "wildfire", "risk", "drought"];

    type Params = FireRiskParams;

    async fn run(ctx: &ToolContext, params: FireRiskParams) -> Result<String, ToolError> {
        let location = resolve_location(ctx, &params.location).await?;

        let mut query = coordinate_query(&location);
        query.push(("current", CURRENT_FIELDS.to_string()));
        query.push(("daily", "precipitation_sum".to_string()));
        query.push(("past_days", LOOKBACK_DAYS.to_string()));
        query.push(("forecast_days", "1".to_string()));
        let url = build_url(&ctx.endpoints.forecast_url, &query)?;

        let body = ctx.upstream.fetch_json(&url, CacheTtl::Realtime).await?;
        let response: FireWeatherResponse = decode(body)?;
        let weather = &response.current;

        let (Some(temperature), Some(humidity), Some(wind)) = (
            weather.temperature_2m,
            weather.relative_humidity_2m,
            weather.wind_speed_10m,
        ) else {
            return Err(ToolError::unexpected_data(
                "temperature, humidity or wind speed missing",
            ));
        };

        let dry = dry_days(&response.daily.precipitation_sum);
        let score = FireScore::assess(temperature, humidity, wind, dry);
        Ok(Self::render(&location, weather, dry, &score))
    }
}
