use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

/// Per-index LRU cache of serialized search responses, keyed by the raw
/// request body. Entries are bound to the snapshot version they were
/// computed against; a refresh invalidates the whole cache, so the cache
/// cannot grow across snapshots.
pub struct QueryCache {
    entries: Mutex<CacheState>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

struct CacheState {
    cache: LruCache<u64, Value>,
    snapshot_version: u64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        QueryCache {
            entries: Mutex::new(CacheState { cache: LruCache::new(capacity), snapshot_version: 0 }),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn key(body: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        body.to_string().hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&self, snapshot_version: u64, key: u64) -> Option<Value> {
        let mut state = self.entries.lock();
        if state.snapshot_version != snapshot_version {
            state.cache.clear();
            state.snapshot_version = snapshot_version;
        }
        let result = state.cache.get(&key).cloned();
        match result {
            Some(_) => self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            None => self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        };
        result
    }

    pub fn put(&self, snapshot_version: u64, key: u64, response: Value) {
        let mut state = self.entries.lock();
        if state.snapshot_version != snapshot_version {
            state.cache.clear();
            state.snapshot_version = snapshot_version;
        }
        state.cache.put(key, response);
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(std::sync::atomic::Ordering::Relaxed),
            self.misses.load(std::sync::atomic::Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_after_put() {
        let cache = QueryCache::new(4);
        let key = QueryCache::key(&json!({"query": {"match_all": {}}}));
        assert!(cache.get(1, key).is_none());
        cache.put(1, key, json!({"took": 1}));
        assert_eq!(cache.get(1, key), Some(json!({"took": 1})));
    }

    #[test]
    fn test_refresh_invalidates() {
        let cache = QueryCache::new(4);
        let key = QueryCache::key(&json!({"q": 1}));
        cache.put(1, key, json!({"took": 1}));
        // New snapshot version drops the cached entry
        assert!(cache.get(2, key).is_none());
    }

    #[test]
    fn test_lru_bounded() {
        let cache = QueryCache::new(2);
        for i in 0..5 {
            cache.put(1, i, json!(i));
        }
        assert!(cache.get(1, 0).is_none());
        assert_eq!(cache.get(1, 4), Some(json!(4)));
    }
}
