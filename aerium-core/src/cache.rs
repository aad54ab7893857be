//! Keyed TTL cache with single-flight loading.
//!
//! Each key owns a slot guarded by an async mutex. A caller that finds the
//! slot empty or expired runs the loader while holding the slot, so
//! concurrent callers on the same key wait for that one computation instead
//! of starting their own. Expiry is lazy: nothing is evicted in the
//! background, an expired entry is replaced on the next access.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    computed_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            computed_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.computed_at.elapsed() >= self.ttl
    }
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<CacheEntry<V>>>>;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Keys with a slot, expired or not.
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A keyed cache of cloneable values.
///
/// # Example
///
/// ```rust
/// use aerium_core::TtlCache;
/// use std::time::Duration;
///
/// tokio_test::block_on(async {
///     let cache: TtlCache<u32> = TtlCache::new();
///     let value = cache
///         .cached("answer", Duration::from_secs(60), || async { Ok::<_, ()>(42) })
///         .await;
///     assert_eq!(value, Ok(42));
/// });
/// ```
#[derive(Debug)]
pub struct TtlCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the unexpired value for `key`, or run `loader` and cache its
    /// result for `ttl`.
    ///
    /// Loader errors are returned to the caller and never cached; the next
    /// caller retries.
    pub async fn cached<F, Fut, E>(&self, key: &str, ttl: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|e| !e.is_expired()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache hit");
            return Ok(cached.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Cache miss");

        match loader().await {
            Ok(value) => {
                *entry = Some(CacheEntry::new(value.clone(), ttl));
                Ok(value)
            }
            Err(err) => {
                *entry = None;
                Err(err)
            }
        }
    }

    /// Drop the entry for `key`. Returns whether a slot existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.slots.lock().remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn slot(&self, key: &str) -> Slot<V> {
        let mut slots = self.slots.lock();
        slots.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_loader_runs_once_within_ttl() {
        let cache = TtlCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move { Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) + 1) };

        assert_eq!(cache.cached("trend:live", TTL, load).await, Ok(1));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.cached("trend:live", TTL, load).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_reruns_after_expiry() {
        let cache = TtlCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move { Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) + 1) };

        assert_eq!(cache.cached("k", TTL, load).await, Ok(1));
        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.cached("k", TTL, load).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = TtlCache::new();
        let a = cache.cached("trend:live", TTL, || async { Ok::<_, ()>("a") }).await;
        let b = cache.cached("trend:import", TTL, || async { Ok::<_, ()>("b") }).await;
        assert_eq!((a, b), (Ok("a"), Ok("b")));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new();
        let failed = cache.cached("k", TTL, || async { Err("store down") }).await;
        assert_eq!(failed, Err("store down"));

        let loaded = cache.cached("k", TTL, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(loaded, Ok(7));
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(TtlCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .cached("heatmap:live", TTL, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ()>(99u32)
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(99));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 9);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = TtlCache::new();
        cache.cached("k", TTL, || async { Ok::<_, ()>(1) }).await.unwrap();
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));

        let value = cache.cached("k", TTL, || async { Ok::<_, ()>(2) }).await;
        assert_eq!(value, Ok(2));

        cache.clear();
        assert!(cache.is_empty());
    }
}
