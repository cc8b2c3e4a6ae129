//! Time-boxed cache-aside layer for aggregate result queries.

use instant::Instant;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Mutex-guarded map with per-entry expiry. Values are cloned out on hit;
/// the lock is never held across the producer's await point, so two
/// concurrent misses may both compute — the later insert wins, which is
/// harmless for idempotent aggregate queries.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached value for `key`, or run `producer` and remember its
    /// result for the cache's TTL. Errors are never cached.
    pub async fn get_or_compute<E, F>(
        &self,
        key: K,
        producer: impl FnOnce() -> F,
    ) -> std::result::Result<V, E>
    where
        F: Future<Output = std::result::Result<V, E>>,
    {
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = producer().await?;
        self.entries.lock().insert(
            key,
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(value)
    }

    /// Drop every entry. Used by the write path to force recomputation of
    /// national results after a tally mutation.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let evicted = entries.len();
        entries.clear();
        if evicted > 0 {
            debug!(evicted, "cache cleared");
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let value: Result<u32, Infallible> = cache
                .get_or_compute("key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(0));
        let calls = AtomicU32::new(0);

        for expected in [1, 2] {
            let value: Result<u32, Infallible> = cache
                .get_or_compute("key", || async {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .await;
            assert_eq!(value.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let err: Result<u32, &str> = cache.get_or_compute("key", || async { Err("boom") }).await;
        assert!(err.is_err());

        let ok: Result<u32, &str> = cache.get_or_compute("key", || async { Ok(3) }).await;
        assert_eq!(ok.unwrap(), 3);
    }

    #[tokio::test]
    async fn clear_evicts_everything() {
        let cache: TtlCache<u8, u32> = TtlCache::new(Duration::from_secs(60));
        for key in 0..4u8 {
            let _: Result<u32, Infallible> = cache
                .get_or_compute(key, || async { Ok(key as u32) })
                .await;
        }
        assert_eq!(cache.len(), 4);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
