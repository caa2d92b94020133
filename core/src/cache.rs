//! Filter result memoization with LRU eviction

use crate::filters::FilterState;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of memoized filter states.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A filter state bound to the dataset generation it was evaluated against.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FilterKey {
    pub generation: u64,
    pub filters: FilterState,
}

impl FilterKey {
    pub fn new(generation: u64, filters: &FilterState) -> Self {
        Self { generation, filters: filters.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct FilterCache {
    cache: Mutex<LruCache<FilterKey, Arc<Vec<usize>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FilterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<FilterKey, Arc<Vec<usize>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached positions for `key`, computing and storing them on a miss.
    pub fn get_or_compute<F>(&self, key: FilterKey, compute: F) -> Arc<Vec<usize>>
    where
        F: FnOnce() -> Vec<usize>,
    {
        if let Some(positions) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(positions);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let positions = Arc::new(compute());
        self.lock().put(key, Arc::clone(&positions));
        positions
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.lock();
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = FilterCache::new(4);
        let filters = FilterState::default();
        let first = cache.get_or_compute(FilterKey::new(1, &filters), || vec![0, 1, 2]);
        let second = cache.get_or_compute(FilterKey::new(1, &filters), || unreachable!());
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn generations_do_not_share_entries() {
        let cache = FilterCache::new(4);
        let filters = FilterState::default();
        cache.get_or_compute(FilterKey::new(1, &filters), || vec![0]);
        let other = cache.get_or_compute(FilterKey::new(2, &filters), || vec![5]);
        assert_eq!(*other, vec![5]);
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = FilterCache::new(1);
        let a = FilterState { search_query: "a".into(), ..FilterState::default() };
        let b = FilterState { search_query: "b".into(), ..FilterState::default() };
        cache.get_or_compute(FilterKey::new(1, &a), Vec::new);
        cache.get_or_compute(FilterKey::new(1, &b), Vec::new);
        cache.get_or_compute(FilterKey::new(1, &a), Vec::new);
        assert_eq!(cache.stats().misses, 3);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn zero_capacity_still_works() {
        let cache = FilterCache::new(0);
        assert_eq!(cache.stats().capacity, 1);
    }
}
