use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded LRU map; a capacity of zero is treated as one entry.
pub struct Cache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: std::hash::Hash + Eq, V: Clone> Cache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Cache {
            inner: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Cloned value, marking the entry as recently used
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
