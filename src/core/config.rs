//! Configuration management for the MCP gateway.
//!
//! This module provides a centralized configuration structure populated from
//! `MCP_*` environment variables (optionally via a `.env` file) on top of
//! defaults. Configuration is validated eagerly: any malformed value is a
//! hard error so the process can refuse to start.

use super::error::{Error, Result};
use super::transport::{SessionConfig, TransportConfig};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure for the MCP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Session lifecycle configuration (HTTP transport only).
    pub session: SessionConfig,

    /// Bearer token verification.
    pub auth: AuthConfig,

    /// Upstream weather data provider endpoints.
    pub upstream: UpstreamConfig,

    /// Response cache tuning.
    pub cache: CacheConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

/// Authentication configuration for the HTTP gateway.
///
/// The identity provider is addressed by its domain; issuer and JWKS
/// location default to the conventional paths under that domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether bearer tokens are required on non-public paths.
    pub enabled: bool,

    /// Identity provider domain, e.g. `tenant.eu.auth0.com`.
    pub domain: Option<String>,

    /// Expected `aud` claim.
    pub audience: Option<String>,

    /// Expected `iss` claim.
    pub issuer: Option<String>,

    /// Location of the JSON Web Key Set.
    pub jwks_url: Option<String>,

    /// The single accepted signing algorithm.
    pub algorithm: Algorithm,

    /// Minimum delay between two JWKS refreshes triggered by unknown key ids.
    pub jwks_cooldown: Duration,

    /// Maximum age of a cached JWKS before it is refreshed unconditionally.
    pub jwks_max_age: Duration,
}

impl AuthConfig {
    /// Expected issuer, derived from the domain when not set explicitly.
    pub fn effective_issuer(&self) -> Option<String> {
        self.issuer
            .clone()
            .or_else(|| self.domain.as_ref().map(|d| format!("https://{d}/")))
    }

    /// JWKS location, derived from the domain when not set explicitly.
    pub fn effective_jwks_url(&self) -> Option<String> {
        self.jwks_url.clone().or_else(|| {
            self.domain
                .as_ref()
                .map(|d| format!("https://{d}/.well-known/jwks.json"))
        })
    }

    /// Base URL of the authorization server.
    pub fn authorization_server_url(&self) -> Option<String> {
        self.domain.as_ref().map(|d| format!("https://{d}"))
    }
}

/// Upstream data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Forecast and current-conditions endpoint.
    pub forecast_url: String,

    /// Place name search endpoint.
    pub geocoding_url: String,

    /// Air quality endpoint.
    pub air_quality_url: String,

    /// Marine conditions endpoint.
    pub marine_url: String,

    /// Timeout applied to every upstream request.
    pub timeout: Duration,
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a caller does not provide one.
    pub default_ttl: Duration,

    /// How often expired entries are physically removed.
    pub sweep_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            domain: None,
            audience: None,
            issuer: None,
            jwks_url: None,
            algorithm: Algorithm::RS256,
            jwks_cooldown: Duration::from_secs(30),
            jwks_max_age: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            air_quality_url: "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
            marine_url: "https://marine-api.open-meteo.com/v1/marine".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "weather-mcp-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            auth: AuthConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// `from_env` is the production entry point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };
        let mut config = Self::default();

        if let Some(name) = env.string("MCP_SERVER_NAME") {
            config.server.name = name;
        }
        if let Some(level) = env.string("MCP_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        config.transport = TransportConfig::from_reader(&env)?;
        config.session = SessionConfig::from_reader(&env)?;

        if let Some(enabled) = env.bool("MCP_AUTH_ENABLED")? {
            config.auth.enabled = enabled;
        }
        config.auth.domain = env.string("MCP_AUTH_DOMAIN");
        config.auth.audience = env.string("MCP_AUTH_AUDIENCE");
        config.auth.issuer = env.string("MCP_AUTH_ISSUER");
        config.auth.jwks_url = env.string("MCP_AUTH_JWKS_URL");
        if let Some(alg) = env.string("MCP_AUTH_ALGORITHM") {
            config.auth.algorithm = Algorithm::from_str(&alg)
                .map_err(|_| Error::config(format!("MCP_AUTH_ALGORITHM: unknown algorithm '{alg}'")))?;
        }

        if let Some(url) = env.string("MCP_UPSTREAM_FORECAST_URL") {
            config.upstream.forecast_url = url;
        }
        if let Some(url) = env.string("MCP_UPSTREAM_GEOCODING_URL") {
            config.upstream.geocoding_url = url;
        }
        if let Some(url) = env.string("MCP_UPSTREAM_AIR_QUALITY_URL") {
            config.upstream.air_quality_url = url;
        }
        if let Some(url) = env.string("MCP_UPSTREAM_MARINE_URL") {
            config.upstream.marine_url = url;
        }
        if let Some(timeout) = env.seconds("MCP_UPSTREAM_TIMEOUT_SECS")? {
            config.upstream.timeout = timeout;
        }
        if let Some(interval) = env.seconds("MCP_CACHE_SWEEP_INTERVAL_SECS")? {
            config.cache.sweep_interval = interval;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::config(format!(
                "MCP_LOG_LEVEL: expected one of {}, got '{}'",
                LOG_LEVELS.join("|"),
                self.logging.level
            )));
        }

        for (key, url) in [
            ("MCP_UPSTREAM_FORECAST_URL", &self.upstream.forecast_url),
            ("MCP_UPSTREAM_GEOCODING_URL", &self.upstream.geocoding_url),
            ("MCP_UPSTREAM_AIR_QUALITY_URL", &self.upstream.air_quality_url),
            ("MCP_UPSTREAM_MARINE_URL", &self.upstream.marine_url),
        ] {
            check_url(key, url)?;
        }

        if let TransportConfig::Http(http) = &self.transport {
            check_url("MCP_PUBLIC_URL", &http.public_url)?;

            if self.auth.enabled {
                if self.auth.domain.is_none() {
                    return Err(Error::config(
                        "MCP_AUTH_DOMAIN is required when authentication is enabled",
                    ));
                }
                if self.auth.audience.is_none() {
                    return Err(Error::config(
                        "MCP_AUTH_AUDIENCE is required when authentication is enabled",
                    ));
                }
                if let Some(jwks) = self.auth.effective_jwks_url() {
                    check_url("MCP_AUTH_JWKS_URL", &jwks)?;
                }
            } else {
                warn!("Authentication disabled - every /mcp request is accepted without a token");
            }
        }

        Ok(())
    }
}

fn check_url(key: &str, value: &str) -> Result<()> {
    reqwest::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::config(format!("{key}: invalid URL '{value}': {e}")))
}

/// Typed access to configuration variables.
pub(crate) struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    /// Non-empty string value.
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Parsed value; present but unparsable is an error.
    pub(crate) fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("{key}: cannot parse '{raw}': {e}")))
            })
            .transpose()
    }

    pub(crate) fn bool(&self, key: &str) -> Result<Option<bool>> {
        self.string(key)
            .map(|raw| match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(Error::config(format!("{key}: expected a boolean, got '{raw}'"))),
            })
            .transpose()
    }

    /// Positive number of seconds.
    pub(crate) fn seconds(&self, key: &str) -> Result<Option<Duration>> {
        match self.parse::<u64>(key)? {
            Some(0) => Err(Error::config(format!("{key}: must be greater than zero"))),
            Some(secs) => Ok(Some(Duration::from_secs(secs))),
            None => Ok(None),
        }
    }
}
