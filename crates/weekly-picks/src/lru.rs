//! Thread-safe LRU map bounded by entry count
//!
//! Backs the memory tier of the score cache. Every access stamps the entry
//! with a monotonically increasing counter; inserting past capacity evicts the
//! entry with the oldest stamp.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

pub struct LruCache<K, V> {
    inner: Mutex<LruCacheInner<K, V>>,
}

struct LruCacheInner<K, V> {
    data: HashMap<K, (V, u64)>, // value, access_time
    capacity: usize,
    access_counter: u64,
}

impl<K: Clone + Hash + Eq, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (0 disables caching)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCacheInner {
                data: HashMap::new(),
                capacity,
                access_counter: 0,
            }),
        }
    }

    /// Get a value, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    /// Insert or replace a value, evicting the least recently used entry if full
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Clone + Hash + Eq, V: Clone> LruCacheInner<K, V> {
    fn get(&mut self, key: &K) -> Option<V> {
        self.access_counter += 1;
        let stamp = self.access_counter;
        self.data.get_mut(key).map(|entry| {
            entry.1 = stamp;
            entry.0.clone()
        })
    }

    fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        self.access_counter += 1;
        let replacing = self.data.contains_key(&key);
        if !replacing && self.data.len() >= self.capacity {
            self.evict_lru();
        }
        self.data.insert(key, (value, self.access_counter));
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|(_, (_, access_time))| *access_time)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruCache")
            .field("len", &inner.data.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}
