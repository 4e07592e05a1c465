//! Authentication error types.

use thiserror::Error;

/// Reasons a request is refused by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header on a protected path.
    #[error("Missing bearer token")]
    MissingToken,

    /// `Authorization` header present but not `Bearer <token>`.
    #[error("Malformed Authorization header, expected 'Bearer <token>'")]
    MalformedHeader,

    /// The token could not be parsed as a JWT.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token header names an algorithm other than the configured one.
    #[error("Token algorithm not allowed")]
    AlgorithmNotAllowed,

    /// No key in the key set matches the token's `kid`.
    #[error("No signing key found for key id '{0}'")]
    UnknownKey(String),

    /// Signature check failed.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// `exp` is in the past.
    #[error("Token has expired")]
    Expired,

    /// `iss` does not match the configured issuer.
    #[error("Token issuer mismatch")]
    InvalidIssuer,

    /// `aud` does not match the configured audience.
    #[error("Token audience mismatch")]
    InvalidAudience,

    /// Any other claim validation failure.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The key set could not be fetched or parsed.
    #[error("Signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidAlgorithm => Self::AlgorithmNotAllowed,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedToken(err.to_string()),
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}
