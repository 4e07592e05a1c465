//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::config::EnvReader;
use crate::core::error::{Error, Result};

/// Transport configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Standard input/output transport for clients that launch the server.
    #[cfg(feature = "stdio")]
    Stdio,

    /// Streamable HTTP gateway with sessions (default).
    Http(HttpConfig),
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Path of the MCP endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,

    /// Answer POSTs with an SSE stream when the client accepts one.
    #[serde(default)]
    pub sse_responses: bool,

    /// Externally visible base URL, used in discovery metadata.
    pub public_url: String,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are swept.
    pub idle_ttl: Duration,

    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_path() -> String {
    "/mcp".to_string()
}

fn default_cors() -> bool {
    true
}

const DEFAULT_PORT: u16 = 8080;

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Http(HttpConfig::default())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: default_host(),
            rpc_path: default_rpc_path(),
            enable_cors: default_cors(),
            sse_responses: false,
            public_url: format!("http://{}:{}", default_host(), DEFAULT_PORT),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl TransportConfig {
    /// Create a STDIO transport config.
    #[cfg(feature = "stdio")]
    pub fn stdio() -> Self {
        Self::Stdio
    }

    /// Create an HTTP transport config.
    pub fn http(port: u16, host: impl Into<String>) -> Self {
        let host = host.into();
        Self::Http(HttpConfig {
            public_url: format!("http://{host}:{port}"),
            port,
            host,
            ..Default::default()
        })
    }

    /// Read `MCP_TRANSPORT` and the `MCP_HTTP_*` variables.
    pub(crate) fn from_reader(env: &EnvReader<'_>) -> Result<Self> {
        let transport = env
            .string("MCP_TRANSPORT")
            .unwrap_or_else(|| "http".to_string())
            .to_lowercase();

        match transport.as_str() {
            #[cfg(feature = "stdio")]
            "stdio" => Ok(Self::Stdio),
            "http" => HttpConfig::from_reader(env).map(Self::Http),
            other => Err(Error::config(format!(
                "MCP_TRANSPORT: unsupported transport '{other}'"
            ))),
        }
    }

    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (standard MCP mode)".to_string(),
            Self::Http(cfg) => format!(
                "Streamable HTTP on {}:{}{}",
                cfg.host, cfg.port, cfg.rpc_path
            ),
        }
    }

    /// Check if this transport is the standard STDIO mode.
    pub fn is_stdio(&self) -> bool {
        #[cfg(feature = "stdio")]
        {
            matches!(self, Self::Stdio)
        }
        #[cfg(not(feature = "stdio"))]
        {
            false
        }
    }
}

impl HttpConfig {
    fn from_reader(env: &EnvReader<'_>) -> Result<Self> {
        let defaults = Self::default();

        let port = env.parse::<u16>("MCP_HTTP_PORT")?.unwrap_or(defaults.port);
        if port == 0 {
            return Err(Error::config("MCP_HTTP_PORT: must be greater than zero"));
        }
        let host = env.string("MCP_HTTP_HOST").unwrap_or(defaults.host);

        let rpc_path = env.string("MCP_HTTP_PATH").unwrap_or(defaults.rpc_path);
        if !rpc_path.starts_with('/') {
            return Err(Error::config(format!(
                "MCP_HTTP_PATH: must start with '/', got '{rpc_path}'"
            )));
        }

        let public_url = env
            .string("MCP_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{host}:{port}"));

        Ok(Self {
            enable_cors: env.bool("MCP_HTTP_CORS")?.unwrap_or(defaults.enable_cors),
            sse_responses: env
                .bool("MCP_HTTP_SSE_RESPONSES")?
                .unwrap_or(defaults.sse_responses),
            port,
            host,
            rpc_path,
            public_url,
        })
    }

    /// Bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URL of the MCP endpoint as seen by clients.
    pub fn resource_url(&self) -> String {
        format!("{}{}", self.public_url, self.rpc_path)
    }
}

impl SessionConfig {
    /// Read the `MCP_SESSION_*` variables.
    pub(crate) fn from_reader(env: &EnvReader<'_>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            idle_ttl: env
                .seconds("MCP_SESSION_IDLE_TTL_SECS")?
                .unwrap_or(defaults.idle_ttl),
            sweep_interval: env
                .seconds("MCP_SESSION_SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.sweep_interval),
        })
    }
}
