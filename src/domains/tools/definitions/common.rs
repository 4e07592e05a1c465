//! Common utilities shared across the weather tools.
//!
//! This module provides location resolution, provider URL building and
//! decoding, and the formatting helpers every report uses.

use reqwest::Url;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::debug;

use crate::core::upstream::CacheTtl;
use crate::domains::tools::{ToolContext, ToolError, Validate};

/// Where a location-based tool should look.
///
/// Either a place name or a coordinate pair, never both.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LocationParams {
    /// Place name to geocode.
    #[schemars(description = "Place name, e.g. \"Lisbon\" or \"Boulder, Colorado\"")]
    #[serde(default)]
    pub location: Option<String>,

    /// Latitude in decimal degrees.
    #[schemars(
        description = "Latitude in decimal degrees (-90 to 90). Use with longitude instead of location",
        range(min = -90.0, max = 90.0)
    )]
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude in decimal degrees.
    #[schemars(
        description = "Longitude in decimal degrees (-180 to 180). Use with latitude instead of location",
        range(min = -180.0, max = 180.0)
    )]
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Validate for LocationParams {
    fn validate(&self) -> Result<(), String> {
        match (&self.location, self.latitude, self.longitude) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err("Provide either location or latitude/longitude, not both".to_string())
            }
            (Some(name), None, None) => {
                if name.trim().is_empty() {
                    Err("location must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
            (None, Some(lat), Some(lon)) => validate_coordinates(lat, lon),
            (None, Some(_), None) | (None, None, Some(_)) => {
                Err("latitude and longitude must be given together".to_string())
            }
            (None, None, None) => {
                Err("Provide a location name or latitude and longitude".to_string())
            }
        }
    }
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude must be between -90 and 90, got {lat}"));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude must be between -180 and 180, got {lon}"));
    }
    Ok(())
}

/// A geocoded place, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub population: Option<u64>,
}

impl Place {
    /// "Name, Region, Country" without empty parts.
    pub fn label(&self) -> String {
        [Some(self.name.as_str()), self.admin1.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

/// Resolved coordinates plus a display label.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Search the geocoder for `name`.
pub async fn search_places(
    ctx: &ToolContext,
    name: &str,
    count: u8,
) -> Result<Vec<Place>, ToolError> {
    let url = build_url(
        &ctx.endpoints.geocoding_url,
        &[
            ("name", name.trim().to_string()),
            ("count", count.to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ],
    )?;
    let body = ctx.upstream.fetch_json(&url, CacheTtl::Static).await?;
    let response: GeocodingResponse = decode(body)?;
    Ok(response.results)
}

/// Turn tool input into coordinates, geocoding a place name when needed.
pub async fn resolve_location(
    ctx: &ToolContext,
    params: &LocationParams,
) -> Result<ResolvedLocation, ToolError> {
    if let (Some(latitude), Some(longitude)) = (params.latitude, params.longitude) {
        return Ok(ResolvedLocation {
            label: format!("{latitude:.4}, {longitude:.4}"),
            latitude,
            longitude,
        });
    }

    let name = params
        .location
        .as_deref()
        .ok_or_else(|| ToolError::invalid_arguments("Provide a location name or coordinates"))?;

    let place = search_places(ctx, name, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::NoMatch(name.trim().to_string()))?;

    debug!(query = name, resolved = %place.label(), "Geocoded location");
    Ok(ResolvedLocation {
        label: place.label(),
        latitude: place.latitude,
        longitude: place.longitude,
    })
}

/// Query parameters every coordinate-based provider call carries.
pub fn coordinate_query(location: &ResolvedLocation) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", location.latitude.to_string()),
        ("longitude", location.longitude.to_string()),
        ("timezone", "auto".to_string()),
    ]
}

/// Build a provider URL with an encoded query string.
pub fn build_url(base: &str, query: &[(&str, String)]) -> Result<String, ToolError> {
    Url::parse_with_params(base, query.iter().map(|(k, v)| (*k, v.as_str())))
        .map(String::from)
        .map_err(|e| ToolError::internal(format!("Invalid provider URL '{base}': {e}")))
}

/// Decode a provider payload into a typed response.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ToolError> {
    serde_json::from_value(value).map_err(|e| ToolError::unexpected_data(e.to_string()))
}

/// Human-readable description of a WMO weather interpretation code.
pub fn describe_weather_code(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown conditions",
    }
}

/// Optional weather code to text.
pub fn describe_optional_code(code: Option<f64>) -> &'static str {
    match code {
        Some(c) if (0.0..=99.0).contains(&c) => describe_weather_code(c as u8),
        _ => "Unknown conditions",
    }
}

/// 16-point compass direction for a bearing in degrees.
pub fn compass_direction(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized / 22.5).round() as usize) % POINTS.len();
    POINTS[index]
}

/// Format an optional reading with its unit, or "n/a".
pub fn fmt_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if unit.is_empty() => format!("{v:.1}"),
        Some(v) => format!("{v:.1} {unit}"),
        None => "n/a".to_string(),
    }
}

/// Start a report with a title line and the location.
pub fn report_header(title: &str, location: &ResolvedLocation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title} for {}", location.label);
    let _ = writeln!(
        out,
        "Coordinates: {:.4}, {:.4}",
        location.latitude, location.longitude
    );
    out
}
