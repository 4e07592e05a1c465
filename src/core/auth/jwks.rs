//! Signing key material.
//!
//! The identity provider publishes its keys as a JSON Web Key Set. Keys are
//! fetched lazily on first use and kept until they exceed the maximum age.
//! A token naming an unknown `kid` triggers a refresh, at most once per
//! cooldown, so a stream of forged tokens cannot hammer the provider.

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::AuthError;

/// Source of token verification keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Key for the given `kid`. Tokens without a `kid` resolve only when the
    /// set holds exactly one key.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError>;
}

/// JWKS fetched over HTTPS and cached in memory.
pub struct RemoteKeySet {
    url: String,
    http: reqwest::Client,
    cooldown: Duration,
    max_age: Duration,
    state: Mutex<KeySetState>,
}

#[derive(Default)]
struct KeySetState {
    keys: Option<JwkSet>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl KeySetState {
    fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        let keys = self.keys.as_ref()?;
        match kid {
            Some(kid) => keys.find(kid),
            None if keys.keys.len() == 1 => keys.keys.first(),
            None => None,
        }
    }

    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.fetched_at
            .is_none_or(|at| now.duration_since(at) >= max_age)
    }

    fn may_refresh(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_attempt
            .is_none_or(|at| now.duration_since(at) >= cooldown)
    }
}

impl RemoteKeySet {
    /// Create a key set that has not been fetched yet.
    pub fn new(url: impl Into<String>, cooldown: Duration, max_age: Duration) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            cooldown,
            max_age,
            state: Mutex::new(KeySetState::default()),
        }
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        debug!(url = %self.url, "Fetching JWKS");
        let response = self
            .http
            .get(&self.url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "JWKS endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))
    }

    /// Refresh the cached set. A failed refresh keeps previously fetched keys.
    async fn refresh(&self, state: &mut KeySetState) -> Result<(), AuthError> {
        let now = Instant::now();
        state.last_attempt = Some(now);

        match self.fetch().await {
            Ok(keys) => {
                info!(count = keys.keys.len(), "Loaded signing keys");
                state.keys = Some(keys);
                state.fetched_at = Some(now);
                Ok(())
            }
            Err(e) if state.keys.is_some() => {
                warn!(error = %e, "JWKS refresh failed, keeping previous keys");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl KeySource for RemoteKeySet {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut refreshed = false;
        if state.is_stale(now, self.max_age) && state.may_refresh(now, self.cooldown) {
            self.refresh(&mut state).await?;
            refreshed = true;
        }

        if state.find(kid).is_none() && !refreshed && state.may_refresh(now, self.cooldown) {
            debug!(?kid, "Unknown key id, refreshing JWKS");
            self.refresh(&mut state).await?;
        }

        if state.keys.is_none() {
            return Err(AuthError::KeySetUnavailable(
                "signing keys not loaded yet".to_string(),
            ));
        }

        let jwk = state
            .find(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.unwrap_or("<none>").to_string()))?;

        DecodingKey::from_jwk(jwk).map_err(|e| AuthError::KeySetUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TEST_KID, spawn_server, test_jwks};
    use axum::{Json, Router, http::StatusCode, routing::get};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn jwks_server(hits: Arc<AtomicUsize>) -> crate::test_support::FakeServer {
        let router = Router::new().route(
            "/jwks",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(test_jwks())
                }
            }),
        );
        spawn_server(router).await
    }

    #[tokio::test]
    async fn test_keys_fetched_lazily_and_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = jwks_server(hits.clone()).await;
        let keys = RemoteKeySet::new(
            server.url("/jwks"),
            Duration::from_secs(30),
            Duration::from_secs(600),
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            keys.decoding_key(Some(TEST_KID)).await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_kid_resolves_single_key() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = jwks_server(hits).await;
        let keys = RemoteKeySet::new(
            server.url("/jwks"),
            Duration::from_secs(30),
            Duration::from_secs(600),
        );
        assert!(keys.decoding_key(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_respects_cooldown() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = jwks_server(hits.clone()).await;
        let keys = RemoteKeySet::new(
            server.url("/jwks"),
            Duration::from_secs(30),
            Duration::from_secs(600),
        );

        keys.decoding_key(Some(TEST_KID)).await.unwrap();
        for _ in 0..3 {
            let err = keys.decoding_key(Some("rotated")).await.err().unwrap();
            assert_eq!(err, AuthError::UnknownKey("rotated".to_string()));
        }
        // the initial load only; the unknown kid arrived inside the cooldown
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_after_cooldown() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = jwks_server(hits.clone()).await;
        let keys = RemoteKeySet::new(server.url("/jwks"), Duration::ZERO, Duration::from_secs(600));

        keys.decoding_key(Some(TEST_KID)).await.unwrap();
        let _ = keys.decoding_key(Some("rotated")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_key_set_is_reported() {
        let router = Router::new().route("/jwks", get(|| async { StatusCode::BAD_GATEWAY }));
        let server = spawn_server(router).await;
        let keys = RemoteKeySet::new(
            server.url("/jwks"),
            Duration::from_secs(30),
            Duration::from_secs(600),
        );

        let err = keys.decoding_key(Some(TEST_KID)).await.err().unwrap();
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
    }
}
