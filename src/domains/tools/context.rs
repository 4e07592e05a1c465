//! Shared dependencies handed to every tool.

use std::sync::Arc;

use crate::core::config::UpstreamConfig;
use crate::core::upstream::UpstreamClient;

/// What a tool needs to reach the weather provider.
#[derive(Clone)]
pub struct ToolContext {
    /// Cached, deduplicating fetch client.
    pub upstream: UpstreamClient,

    /// Provider endpoint URLs.
    pub endpoints: Arc<UpstreamConfig>,
}

impl ToolContext {
    pub fn new(upstream: UpstreamClient, endpoints: UpstreamConfig) -> Self {
        Self {
            upstream,
            endpoints: Arc::new(endpoints),
        }
    }
}
