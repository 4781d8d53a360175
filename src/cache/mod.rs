//! In-process TTL cache used to memoize service catalog queries.
//!
//! Entries carry an absolute expiry. Expired entries are evicted lazily when
//! read, and the whole map is swept once it grows past
//! [`SWEEP_THRESHOLD`] entries. There is no LRU ordering and no hard size
//! bound. The cache lives in one process only: a second instance or a cold
//! start sees an empty cache and falls through to the database.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry count above which a `set` triggers a sweep of expired entries
pub const SWEEP_THRESHOLD: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store `value` under `key` until `ttl` has elapsed. Last write wins.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.into(), CacheEntry { value, expires_at });

        if self.entries.len() > SWEEP_THRESHOLD {
            let removed = self.cleanup_expired();
            tracing::debug!(removed, remaining = self.entries.len(), "Cache sweep");
        }
    }

    /// Return the cached value, or `None` if it is missing or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be released before removing
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`, returning how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    ///
    /// Errors from `fetch` are returned as-is and nothing is cached.
    /// Concurrent misses on the same key each run `fetch`; the last one to
    /// finish wins.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let value = fetch().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

/// Spawn a background task that periodically evicts expired cache entries
pub fn spawn_cleanup_task<V>(cache: Arc<MemoryCache<V>>, cleanup_interval_secs: u64)
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup_expired();
            tracing::debug!(
                removed,
                remaining = cache.len(),
                "Cache cleanup complete"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_before_and_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("packages", vec![1, 2, 3], Duration::from_millis(50));

        assert_eq!(cache.get("packages"), Some(vec![1, 2, 3]));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("packages"), None);
        // Lazy eviction removed the entry on read
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_key() {
        let cache: MemoryCache<String> = MemoryCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MemoryCache::new();
        cache.set("k", "first".to_string(), Duration::from_secs(60));
        cache.set("k", "second".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k").as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let cache = MemoryCache::new();
        cache.set("k", 1u32, Duration::ZERO);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_sweep_runs_past_threshold() {
        let cache = MemoryCache::new();
        for i in 0..SWEEP_THRESHOLD {
            cache.set(format!("stale:{}", i), i, Duration::ZERO);
        }
        assert_eq!(cache.len(), SWEEP_THRESHOLD);

        // Crossing the threshold sweeps every expired entry
        cache.set("fresh", 7, Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(7));
    }

    #[test]
    fn test_delete_and_invalidate_prefix() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("packages:active", 1, ttl);
        cache.set("modules:all", 2, ttl);
        cache.set("modules:exterior", 3, ttl);

        assert_eq!(cache.invalidate_prefix("modules:"), 2);
        assert_eq!(cache.get("packages:active"), Some(1));
        assert!(cache.delete("packages:active"));
        assert!(!cache.delete("packages:active"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired_keeps_live_entries() {
        let cache = MemoryCache::new();
        cache.set("old", 1, Duration::ZERO);
        cache.set("new", 2, Duration::from_secs(60));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_try_insert_with_memoizes() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            let value: Result<u32, String> = cache
                .get_or_try_insert_with("k", ttl, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value, Ok(42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_try_insert_with_does_not_cache_errors() {
        let cache: MemoryCache<u32> = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        let err: Result<u32, &str> = cache
            .get_or_try_insert_with("k", ttl, || async { Err("db down") })
            .await;
        assert_eq!(err, Err("db down"));
        assert!(cache.get("k").is_none());

        let ok: Result<u32, &str> = cache
            .get_or_try_insert_with("k", ttl, || async { Ok(5) })
            .await;
        assert_eq!(ok, Ok(5));
        assert_eq!(cache.get("k"), Some(5));
    }
}
