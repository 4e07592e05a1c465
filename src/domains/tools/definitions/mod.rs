//! Tool definitions module.
//!
//! This module exports all available tool definitions.
//! Each tool is defined in its own file for better maintainability.

pub mod air_quality;
pub mod common;
pub mod current_weather;
pub mod fire_risk;
pub mod forecast;
pub mod geocode;
pub mod marine;
pub mod soil;

pub use air_quality::{AirQualityParams, AirQualityTool};
pub use common::LocationParams;
pub use current_weather::{CurrentWeatherParams, CurrentWeatherTool};
pub use fire_risk::{FireRiskParams, FireRiskTool};
pub use forecast::{ForecastParams, WeatherForecastTool};
pub use geocode::{GeocodeLocationTool, GeocodeParams};
pub use marine::{MarineConditionsTool, MarineParams};
pub use soil::{SoilConditionsTool, SoilParams};
