//! Upstream fetch wrapper.
//!
//! [`UpstreamClient::fetch_json`] answers from the cache when it can. On a
//! miss it joins an identical request that is already in flight, or starts
//! one. The physical request runs as its own task: it stores a successful
//! result in the cache and leaves the in-flight ledger when it settles, even
//! if every caller has gone away in the meantime.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::cache::{CacheStore, CacheTtl};
use super::error::FetchError;

type PendingFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Cached, deduplicating JSON client for the upstream data provider.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    cache: Arc<dyn CacheStore>,
    in_flight: Mutex<HashMap<String, PendingFetch>>,
    default_timeout: Duration,
}

impl UpstreamClient {
    /// Create a client with its own connection pool.
    pub fn new(cache: Arc<dyn CacheStore>, default_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .unwrap_or_default();
        Self::with_http_client(http, cache, default_timeout)
    }

    /// Create a client on top of an existing `reqwest::Client`.
    pub fn with_http_client(
        http: reqwest::Client,
        cache: Arc<dyn CacheStore>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                cache,
                in_flight: Mutex::new(HashMap::new()),
                default_timeout,
            }),
        }
    }

    /// The cache this client reads through.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }

    /// Number of physical requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.inner.ledger().len()
    }

    /// Fetch and decode `url` with the default timeout.
    pub async fn fetch_json(&self, url: &str, ttl: CacheTtl) -> Result<Value, FetchError> {
        self.fetch_json_with_timeout(url, ttl, self.inner.default_timeout)
            .await
    }

    /// Fetch and decode `url`, bounding the physical request by `timeout`.
    #[instrument(skip(self, ttl, timeout))]
    pub async fn fetch_json_with_timeout(
        &self,
        url: &str,
        ttl: CacheTtl,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        if let Some(hit) = self.inner.cache.get(url).await {
            debug!("Cache hit");
            return Ok(hit);
        }

        let pending = {
            let mut ledger = self.inner.ledger();
            match ledger.get(url) {
                Some(pending) => {
                    debug!("Joining in-flight request");
                    pending.clone()
                }
                None => {
                    let pending = Inner::start(Arc::clone(&self.inner), url, ttl, timeout);
                    ledger.insert(url.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }
}

impl Inner {
    fn ledger(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingFetch>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the physical request. Must be called with the ledger locked so
    /// the task cannot leave the ledger before it has been entered.
    fn start(inner: Arc<Self>, url: &str, ttl: CacheTtl, timeout: Duration) -> PendingFetch {
        let key = url.to_string();
        let task = tokio::spawn(async move {
            let result = inner.get_json(&key, timeout).await;
            if let Ok(value) = &result {
                inner.cache.set(&key, value.clone(), ttl.duration()).await;
            }
            inner.ledger().remove(&key);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let host = parsed.host_str().unwrap_or("upstream").to_string();

        debug!(%host, "Fetching upstream JSON");
        let response = self
            .http
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, &host, timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%host, status = status.as_u16(), "Upstream returned an error status");
            return Err(FetchError::Status {
                host,
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    host: host.clone(),
                    after: timeout,
                }
            } else {
                FetchError::Decode {
                    host: host.clone(),
                    message: e.to_string(),
                }
            }
        })
    }
}

fn classify(err: reqwest::Error, host: &str, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            host: host.to_string(),
            after: timeout,
        }
    } else {
        FetchError::Network {
            host: host.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::upstream::MemoryCache;
    use crate::test_support::spawn_server;
    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client(timeout: Duration) -> UpstreamClient {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        UpstreamClient::new(cache, timeout)
    }

    fn counting_router(hits: Arc<AtomicUsize>, status: StatusCode, delay: Duration) -> Router {
        Router::new().route(
            "/data",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    (status, Json(json!({"temperature": 18.2})))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server =
            spawn_server(counting_router(hits.clone(), StatusCode::OK, Duration::ZERO)).await;
        let client = client(Duration::from_secs(5));
        let url = server.url("/data");

        let first = client.fetch_json(&url, CacheTtl::Realtime).await.unwrap();
        let second = client.fetch_json(&url, CacheTtl::Realtime).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(client.cache().has(&url).await);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = spawn_server(counting_router(
            hits.clone(),
            StatusCode::OK,
            Duration::from_millis(200),
        ))
        .await;
        let client = client(Duration::from_secs(5));
        let url = server.url("/data");

        let calls = (0..10).map(|_| client.fetch_json(&url, CacheTtl::Realtime));
        let results = futures::future::join_all(calls).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_error_and_are_not_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = spawn_server(counting_router(
            hits.clone(),
            StatusCode::SERVICE_UNAVAILABLE,
            Duration::from_millis(200),
        ))
        .await;
        let client = client(Duration::from_secs(5));
        let url = server.url("/data");

        let calls = (0..5).map(|_| client.fetch_json(&url, CacheTtl::Realtime));
        let results = futures::future::join_all(calls).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let expected = FetchError::Status {
            host: "127.0.0.1".to_string(),
            status: 503,
        };
        assert!(results.iter().all(|r| r.as_ref() == Err(&expected)));
        assert!(!client.cache().has(&url).await);

        let retry = client.fetch_json(&url, CacheTtl::Realtime).await;
        assert_eq!(retry.unwrap_err().status(), Some(503));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = spawn_server(counting_router(
            hits.clone(),
            StatusCode::OK,
            Duration::from_secs(5),
        ))
        .await;
        let client = client(Duration::from_secs(5));

        let err = client
            .fetch_json_with_timeout(
                &server.url("/data"),
                CacheTtl::Realtime,
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_json_body_is_a_decode_error() {
        let router = Router::new().route("/data", get(|| async { "not json" }));
        let server = spawn_server(router).await;
        let client = client(Duration::from_secs(5));

        let err = client
            .fetch_json(&server.url("/data"), CacheTtl::Realtime)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let client = client(Duration::from_secs(1));
        let err = client
            .fetch_json("not a url", CacheTtl::Realtime)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::InvalidUrl("not a url".to_string()));
    }

    #[tokio::test]
    async fn test_request_settles_after_caller_is_cancelled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = spawn_server(counting_router(
            hits.clone(),
            StatusCode::OK,
            Duration::from_millis(100),
        ))
        .await;
        let client = client(Duration::from_secs(5));
        let url = server.url("/data");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            client.fetch_json(&url, CacheTtl::Realtime),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.in_flight(), 0);
        assert!(client.cache().has(&url).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
