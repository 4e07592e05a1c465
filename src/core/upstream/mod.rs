//! Upstream data access.
//!
//! - `cache.rs` - expiring key-value store behind the async [`CacheStore`] trait
//! - `client.rs` - timeout-bounded JSON fetches with caching and stampede protection
//! - `error.rs` - [`FetchError`], shared by every waiter of a collapsed request

mod cache;
mod client;
mod error;

pub use cache::{CacheStore, CacheTtl, MemoryCache};
pub use client::UpstreamClient;
pub use error::FetchError;
