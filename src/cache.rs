use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Shared, bounded LRU map used for every per-guild in-memory cache.
pub struct BoundedCache<K: Hash + Eq, V> {
    cache: Arc<Mutex<LruCache<K, V>>>,
}

impl<K: Hash + Eq, V> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN.saturating_add(99));
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, value);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.pop(key)
    }

    /// Runs `f` against the entry for `key`, inserting `default()` first if absent.
    pub fn update<R>(&self, key: K, default: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let entry = cache.get_or_insert_mut(key, default);
        f(entry)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_lru() {
        let cache: BoundedCache<u64, String> = BoundedCache::new(2);

        cache.insert(1, "one".to_string());
        cache.insert(2, "two".to_string());

        // Touch 1 so that 2 becomes the least recently used entry
        assert!(cache.get(&1).is_some());

        cache.insert(3, "three".to_string());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&2).is_none());
        assert!(cache.get(&3).is_some());
    }

    #[test]
    fn test_update_inserts_default() {
        let cache: BoundedCache<&'static str, u32> = BoundedCache::new(4);
        let value = cache.update("hits", || 0, |v| {
            *v += 1;
            *v
        });
        assert_eq!(value, 1);
        cache.update("hits", || 0, |v| *v += 1);
        assert_eq!(cache.get(&"hits"), Some(2));
    }

    #[test]
    fn test_clones_share_storage() {
        let cache: BoundedCache<u64, u64> = BoundedCache::new(4);
        let other = cache.clone();
        other.insert(7, 49);
        assert_eq!(cache.get(&7), Some(49));
        assert_eq!(cache.remove(&7), Some(49));
        assert!(other.is_empty());
    }
}
