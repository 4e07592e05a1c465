//! Expiring response cache.
//!
//! The gateway talks to its cache only through [`CacheStore`], so the
//! in-memory store can be replaced by a shared key-value service without
//! touching call sites. Every operation is async for that reason, even though
//! [`MemoryCache`] never suspends.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Narrow key-value contract used by the upstream client.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`; expired entries read as absent.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value`, replacing any previous entry. `None` uses the store default TTL.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Whether a live entry exists.
    async fn has(&self, key: &str) -> bool;

    /// Remove an entry, returning whether a live one existed.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every entry.
    async fn clear(&self);

    /// Number of live entries.
    async fn size(&self) -> usize;
}

/// TTL classes by data volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// Near-real-time observations (current conditions, air quality, sea state).
    Realtime,
    /// Forecast series.
    Forecast,
    /// Reference lookups such as geocoding.
    Static,
    /// Whatever the store is configured with.
    StoreDefault,
}

impl CacheTtl {
    /// Concrete TTL, or `None` to defer to the store default.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Realtime => Some(Duration::from_secs(5 * 60)),
            Self::Forecast => Some(Duration::from_secs(30 * 60)),
            Self::Static => Some(Duration::from_secs(24 * 60 * 60)),
            Self::StoreDefault => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local [`CacheStore`].
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Physically remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries()
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    async fn clear(&self) {
        self.entries().clear();
    }

    async fn size(&self) -> usize {
        let now = Instant::now();
        self.entries().values().filter(|e| e.is_live(now)).count()
    }
}
