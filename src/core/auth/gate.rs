//! Authentication gate.
//!
//! Decides per request whether it may proceed. Public paths pass untouched;
//! everything else needs a bearer JWT signed by the identity provider for
//! the configured issuer and audience.

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, Validation};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::error::AuthError;
use super::identity::{AccessClaims, AuthenticatedIdentity};
use super::jwks::{KeySource, RemoteKeySet};
use crate::core::config::AuthConfig;
use crate::core::error::{Error, Result};

/// Paths reachable without credentials: liveness, discovery metadata, the
/// tool manifest and the delegated authorization endpoints.
pub const PUBLIC_PATHS: [&str; 9] = [
    "/health",
    "/tools",
    "/.well-known/openid-configuration",
    "/.well-known/oauth-authorization-server",
    "/.well-known/oauth-protected-resource",
    "/authorize",
    "/token",
    "/register",
    "/logout",
];

/// Per-request authentication decision.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Option<Arc<Verifier>>,
}

struct Verifier {
    keys: Arc<dyn KeySource>,
    algorithm: Algorithm,
    validation: Validation,
}

impl AuthGate {
    /// Gate verifying tokens with `keys`.
    pub fn new(keys: Arc<dyn KeySource>, issuer: &str, audience: &str, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        Self {
            verifier: Some(Arc::new(Verifier {
                keys,
                algorithm,
                validation,
            })),
        }
    }

    /// Gate that lets every request through without an identity.
    pub fn disabled() -> Self {
        Self { verifier: None }
    }

    /// Build the gate described by configuration.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let issuer = config
            .effective_issuer()
            .ok_or_else(|| Error::config("authentication enabled without an issuer"))?;
        let audience = config
            .audience
            .as_deref()
            .ok_or_else(|| Error::config("authentication enabled without an audience"))?;
        let jwks_url = config
            .effective_jwks_url()
            .ok_or_else(|| Error::config("authentication enabled without a JWKS location"))?;

        let keys = RemoteKeySet::new(jwks_url, config.jwks_cooldown, config.jwks_max_age);
        Ok(Self::new(Arc::new(keys), &issuer, audience, config.algorithm))
    }

    /// Whether tokens are checked at all.
    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    /// Whether `path` bypasses verification.
    pub fn is_public(path: &str) -> bool {
        PUBLIC_PATHS.contains(&path)
    }

    /// Decide a request.
    ///
    /// `Ok(None)` means the request proceeds without an identity (public path
    /// or gate disabled).
    #[instrument(skip(self, headers))]
    pub async fn check(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<Option<AuthenticatedIdentity>, AuthError> {
        let Some(verifier) = &self.verifier else {
            return Ok(None);
        };
        if Self::is_public(path) {
            return Ok(None);
        }

        let token = bearer_token(headers)?;
        let identity = verifier.verify(token).await?;
        debug!(client_id = %identity.client_id, "Token verified");
        Ok(Some(identity))
    }
}

impl Verifier {
    async fn verify(&self, token: &str) -> std::result::Result<AuthenticatedIdentity, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != self.algorithm {
            return Err(AuthError::AlgorithmNotAllowed);
        }

        let key = self.keys.decoding_key(header.kid.as_deref()).await?;
        let data = jsonwebtoken::decode::<AccessClaims>(token, &key, &self.validation)?;
        Ok(data.claims.into())
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> std::result::Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}
