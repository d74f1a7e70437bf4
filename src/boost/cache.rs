//! Planning reply cache with TTL and LRU eviction
//!
//! Skips a planning call when the exact same prompt was sent to the same
//! model moments ago. Only successful replies are stored.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

pub const DEFAULT_CAPACITY: usize = 32;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedPlan {
    text: String,
    cached_at: Instant,
}

impl CachedPlan {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

struct Inner {
    entries: LruCache<String, CachedPlan>,
    stats: CacheStats,
}

pub struct PlanningCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl Default for PlanningCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl PlanningCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    /// Cache key: sha256 of model and prompt
    pub fn fingerprint(model: &str, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;

        let lookup = inner.entries.get(key).map(|e| (e.is_expired(self.ttl), e.text.clone()));
        match lookup {
            Some((false, text)) => {
                inner.stats.hits += 1;
                Some(text)
            }
            Some((true, _)) => {
                inner.entries.pop(key);
                inner.stats.expired += 1;
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub async fn insert(&self, key: String, text: impl Into<String>) {
        let entry = CachedPlan {
            text: text.into(),
            cached_at: Instant::now(),
        };
        self.inner.lock().await.entries.put(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats
    }

    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_model_and_prompt() {
        let a = PlanningCache::fingerprint("gpt-4o", "hello");
        assert_eq!(a, PlanningCache::fingerprint("gpt-4o", "hello"));
        assert_ne!(a, PlanningCache::fingerprint("o1", "hello"));
        assert_ne!(a, PlanningCache::fingerprint("gpt-4o", "hello!"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = PlanningCache::default();
        let key = PlanningCache::fingerprint("m", "p");
        assert_eq!(cache.get(&key).await, None);

        cache.insert(key.clone(), "SUMMARY:\nhi").await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("SUMMARY:\nhi"));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_removed() {
        let cache = PlanningCache::new(4, Duration::from_millis(10));
        cache.insert("k".to_string(), "v").await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.expired, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = PlanningCache::new(2, DEFAULT_TTL);
        cache.insert("a".to_string(), "1").await;
        cache.insert("b".to_string(), "2").await;
        assert!(cache.get("a").await.is_some());
        cache.insert("c".to_string(), "3").await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = PlanningCache::default();
        cache.insert("a".to_string(), "1").await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
