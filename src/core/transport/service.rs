//! Transport service - builds the object graph and runs the configured transport.
//!
//! Everything long-lived (cache, upstream client, tool registry, session
//! manager, auth gate) is constructed here from [`Config`] and passed down
//! explicitly.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::TransportConfig;
use super::http::{AppState, HttpTransport};
use super::oauth::OAuthProxy;
use super::session::{ServerIdentity, SessionManager};
use crate::core::auth::AuthGate;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::server::SERVER_INSTRUCTIONS;
use crate::core::upstream::{MemoryCache, UpstreamClient};
use crate::domains::tools::{RegistryEngineFactory, ToolContext, ToolRegistry};

#[cfg(feature = "stdio")]
use super::stdio::StdioTransport;
#[cfg(feature = "stdio")]
use crate::core::McpServer;

/// Transport service - manages the transport layer for the MCP server.
pub struct TransportService {
    config: Config,
    registry: Arc<ToolRegistry>,
    cache: Arc<MemoryCache>,
}

impl TransportService {
    /// Build the shared components for `config`.
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(MemoryCache::new(config.cache.default_ttl));
        let upstream = UpstreamClient::new(cache.clone(), config.upstream.timeout);
        let context = ToolContext::new(upstream, config.upstream.clone());
        let registry = Arc::new(ToolRegistry::new(context));

        Self {
            config,
            registry,
            cache,
        }
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config.transport
    }

    /// The tool catalog shared by every session.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            name: self.config.server.name.clone(),
            version: self.config.server.version.clone(),
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }

    /// Log information about the configured transport.
    pub fn log_info(&self) {
        info!(
            tools = self.registry.entries().len(),
            "Starting transport: {}",
            self.config.transport.description()
        );
    }

    /// Run until the transport ends or the process is interrupted.
    pub async fn run(self) -> Result<()> {
        self.log_info();

        let shutdown = CancellationToken::new();
        let cache_sweeper = self
            .cache
            .spawn_sweeper(self.config.cache.sweep_interval, shutdown.clone());
        let signal = tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

        let result = self.serve(shutdown.clone()).await;

        shutdown.cancel();
        signal.abort();
        let _ = cache_sweeper.await;
        result
    }

    async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        match &self.config.transport {
            #[cfg(feature = "stdio")]
            TransportConfig::Stdio => {
                let server = McpServer::new(&self.registry, self.identity());
                StdioTransport::run(server, shutdown).await?;
            }
            TransportConfig::Http(http) => {
                let factory = RegistryEngineFactory::new(self.registry.clone(), self.identity());
                let manager = Arc::new(SessionManager::new(
                    Arc::new(factory),
                    self.config.session.clone(),
                    http.sse_responses,
                ));
                let gate = AuthGate::from_config(&self.config.auth)?;
                if !gate.is_enabled() {
                    warn!("Authentication disabled - requests are not verified");
                }
                let oauth = OAuthProxy::from_config(&self.config.auth, http);
                if oauth.is_none() {
                    info!("No identity provider configured - OAuth endpoints disabled");
                }

                let state = AppState {
                    manager,
                    gate,
                    registry: self.registry.clone(),
                    oauth,
                };
                HttpTransport::new(http.clone()).run(state, shutdown).await?;
            }
        }
        Ok(())
    }
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received"),
        Err(e) => {
            warn!(error = %e, "Could not listen for interrupts");
            return;
        }
    }
    shutdown.cancel();
}
