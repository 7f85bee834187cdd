//! Time-limited result cache in front of the transport.

use crate::error::{Result, ScanError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// One remembered fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix milliseconds
    pub stored_at: i64,
    pub payload: Value,
}

impl CacheEntry {
    pub fn new(payload: Value) -> Self {
        Self {
            stored_at: Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Valid iff `now - stored_at < ttl`. A zero ttl makes every entry stale.
    pub fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(self.stored_at) < ttl_ms
    }
}

/// Durable key/value storage behind [`ResultCache`].
///
/// Distinct keys must not interfere; concurrent writes to the same key are
/// last-write-wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;
    /// Flush and release the store. Later calls to `get`/`put` fail.
    fn close(&self) -> Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        (**self).put(key, entry)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Process-local store, used in tests and when no cache file can be opened.
pub struct MemoryCacheStore {
    entries: Mutex<Option<HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Some(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let map = entries.as_ref().ok_or_else(closed)?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let map = entries.as_mut().ok_or_else(closed)?;
        map.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

fn closed() -> ScanError {
    ScanError::CacheError("cache store is closed".to_string())
}

pub struct ResultCache {
    store: Box<dyn CacheStore>,
    ttl: Duration,
    prefix: String,
}

impl ResultCache {
    /// `prefix` namespaces every key (normally the site fingerprint).
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration, prefix: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            prefix: prefix.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Return the remembered value for `key`, or run `fetch` and remember
    /// its result. The flag is `true` on a cache hit.
    ///
    /// Store failures are logged and degrade to a miss / skipped write.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> (Value, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Value>,
    {
        let full_key = self.full_key(key);

        if self.is_enabled() {
            match self.store.get(&full_key) {
                Ok(Some(entry)) if entry.is_fresh(Utc::now().timestamp_millis(), self.ttl) => {
                    debug!("Cache hit for key: {}", key);
                    return (entry.payload, true);
                }
                Ok(Some(_)) => debug!("Cache expired for key: {}", key),
                Ok(None) => {}
                Err(e) => warn!("Cache read failed for key {}: {}", key, e),
            }
        }

        let value = fetch().await;

        if self.is_enabled() {
            match self.store.put(&full_key, &CacheEntry::new(value.clone())) {
                Ok(()) => debug!("Updated cache for key: {}", key),
                Err(e) => warn!("Cache write failed for key {}: {}", key, e),
            }
        }

        (value, false)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    async fn counted_fetch(cache: &ResultCache, key: &str, calls: &AtomicUsize) -> (Value, bool) {
        cache
            .get_or_fetch(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                json!([{"layoutId": 1}])
            })
            .await
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let cache = ResultCache::new(Box::new(MemoryCacheStore::new()), HOUR, "site");
        let calls = AtomicUsize::new(0);

        let (first, first_hit) = counted_fetch(&cache, "k", &calls).await;
        let (second, second_hit) = counted_fetch(&cache, "k", &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first_hit);
        assert!(second_hit);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(Box::new(store.clone()), Duration::ZERO, "site");
        let calls = AtomicUsize::new(0);

        let (_, first_hit) = counted_fetch(&cache, "k", &calls).await;
        let (_, second_hit) = counted_fetch(&cache, "k", &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!first_hit && !second_hit);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let store = Arc::new(MemoryCacheStore::new());
        let stale = CacheEntry {
            stored_at: Utc::now().timestamp_millis() - 2 * 3_600_000,
            payload: json!(["stale"]),
        };
        store.put("site:k", &stale).unwrap();

        let cache = ResultCache::new(Box::new(store.clone()), HOUR, "site");
        let calls = AtomicUsize::new(0);
        let (value, hit) = counted_fetch(&cache, "k", &calls).await;

        assert!(!hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(value, json!([{"layoutId": 1}]));
        assert_eq!(store.get("site:k").unwrap().unwrap().payload, value);
    }

    #[tokio::test]
    async fn test_prefix_separates_sites() {
        let store = Arc::new(MemoryCacheStore::new());
        let site_a = ResultCache::new(Box::new(store.clone()), HOUR, "a");
        let site_b = ResultCache::new(Box::new(store.clone()), HOUR, "b");
        let calls = AtomicUsize::new(0);

        counted_fetch(&site_a, "k", &calls).await;
        let (_, hit) = counted_fetch(&site_b, "k", &calls).await;

        assert!(!hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_store_degrades_to_fetch() {
        let cache = ResultCache::new(Box::new(MemoryCacheStore::new()), HOUR, "site");
        cache.close().unwrap();

        let calls = AtomicUsize::new(0);
        let (_, hit) = counted_fetch(&cache, "k", &calls).await;
        let (_, hit_again) = counted_fetch(&cache, "k", &calls).await;

        assert!(!hit && !hit_again);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_freshness_boundary() {
        let entry = CacheEntry {
            stored_at: 1_000_000,
            payload: json!([]),
        };
        let ttl = Duration::from_secs(60);
        assert!(entry.is_fresh(1_000_000, ttl));
        assert!(entry.is_fresh(1_059_999, ttl));
        assert!(!entry.is_fresh(1_060_000, ttl));
        assert!(!entry.is_fresh(1_000_000, Duration::ZERO));
    }
}
