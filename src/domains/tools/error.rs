//! Tool-specific error types.

use rmcp::model::{CallToolResult, Content};
use thiserror::Error;
use tracing::warn;

use crate::core::upstream::FetchError;

/// Errors that can occur during tool operations.
///
/// Only [`ToolError::InvalidArguments`] reaches the client as a protocol
/// error; everything else is reported as a tool result with `isError` set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Geocoding found nothing for the given place name.
    #[error(
        "Could not find a location matching '{0}'. Try a more specific place name, or pass latitude and longitude."
    )]
    NoMatch(String),

    /// The upstream provider could not be reached or refused the request.
    #[error("{0}")]
    Upstream(#[from] FetchError),

    /// The provider has no data of this kind for the location.
    #[error("{0}")]
    Unavailable(String),

    /// The provider answered, but not with data the tool can use.
    #[error("Unexpected data from the weather provider: {0}")]
    UnexpectedData(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "unexpected data" error.
    pub fn unexpected_data(msg: impl Into<String>) -> Self {
        Self::UnexpectedData(msg.into())
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Render as a failed tool result.
    pub fn into_result(self) -> CallToolResult {
        let message = self.to_string();
        warn!("{}", message);
        CallToolResult::error(vec![Content::text(message)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_message_names_input() {
        let err = ToolError::NoMatch("Atlantis".to_string());
        assert!(err.to_string().starts_with("Could not find a location matching 'Atlantis'"));
    }

    #[test]
    fn test_upstream_error_renders_as_failed_result() {
        let err: ToolError = FetchError::Status {
            host: "api.open-meteo.com".to_string(),
            status: 503,
        }
        .into();
        let result = err.into_result();
        assert_eq!(result.is_error, Some(true));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value["content"][0]["text"],
            "Upstream api.open-meteo.com returned HTTP 503"
        );
    }
}
