//! Content-addressed cache fronting idempotent reads.
//!
//! ABI fetches, contract metadata, token prices, icon probes, signature
//! lookups and ENS resolutions all go through a `Cache` implementation.
//! A miss, or the absence of a cache entirely, degrades to a direct fetch --
//! never an error. `TtlCache` is an in-memory implementation sufficient for
//! a single process; a distributed deployment would swap in something
//! backed by Redis or similar behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Namespaced key/value cache with per-entry TTL, enforced by the caller.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
}

/// Build a namespaced cache key from an operation name and its parameters.
pub fn cache_key(op: &str, params: &[&str]) -> String {
    format!("{op}:{}", params.join(":"))
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory TTL cache. `ttl = Duration::MAX`-style "forever" entries are
/// supported by passing a very large duration; there is no dedicated
/// no-expiry variant because every caller in this crate has a natural TTL.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for TtlCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.lock().expect("cache lock poisoned");
        match guard.get(key) {
            Some(entry) => {
                if let Some(expires_at) = entry.expires_at {
                    if Instant::now() >= expires_at {
                        guard.remove(key);
                        return None;
                    }
                }
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Some(Instant::now() + ttl);
        let mut guard = self.entries.lock().expect("cache lock poisoned");
        guard.insert(key.to_string(), Entry { value, expires_at });
    }
}

/// A cache that never stores anything. Every caller degrades to a direct
/// fetch, exercising the "absent cache is not an error" testable property.
#[derive(Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_within_ttl() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = TtlCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn null_cache_always_misses() {
        let cache = NullCache;
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn cache_key_is_namespaced() {
        assert_eq!(cache_key("abi", &["0xabc"]), "abi:0xabc");
        assert_eq!(cache_key("price", &["0xabc", "usd"]), "price:0xabc:usd");
    }
}
