//! Upstream fetch error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching from the upstream data provider.
///
/// The type is `Clone` because one failed physical request is reported to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider answered with a non-success status.
    #[error("Upstream {host} returned HTTP {status}")]
    Status { host: String, status: u16 },

    /// No complete answer arrived within the request timeout.
    #[error("Upstream {host} did not respond within {}s", .after.as_secs_f64())]
    Timeout { host: String, after: Duration },

    /// Connection-level failure (DNS, refused, reset).
    #[error("Could not reach upstream {host}: {message}")]
    Network { host: String, message: String },

    /// The body was not valid JSON.
    #[error("Upstream {host} sent an unreadable response: {message}")]
    Decode { host: String, message: String },

    /// The request URL could not be parsed.
    #[error("Invalid upstream URL '{0}'")]
    InvalidUrl(String),

    /// The background task performing the request was cancelled or panicked.
    #[error("Upstream request aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// HTTP status code, when the failure came from the provider's answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure was the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
