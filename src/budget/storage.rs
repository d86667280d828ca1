//! Thread-safe keyed storage of [`TokenFilter`]s, one per `(budget_key_name,
//! time_bucket)`. Grounded on the teacher's `HashMapFilterStorage`
//! (key -> filter map, lazily populated), generalized from single-threaded
//! `&mut self` access to safe concurrent access by building it on
//! [`crate::concurrency::ConcurrentMap`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::concurrency::{ConcurrentMap, MapError};

use super::filter::TokenFilter;

/// All time-bucket filters for one canonical budget key name.
pub(crate) type BucketFilters = Mutex<HashMap<u64, TokenFilter>>;

/// Lazily-populated, thread-safe filter storage. Each distinct canonical key
/// name gets its own `Mutex<HashMap<time_bucket, TokenFilter>>`, so callers
/// touching different keys never contend, and callers touching the same key
/// at different time buckets still serialize only on that key's lock.
pub struct KeyedFilterStorage {
    keys: ConcurrentMap<String, Arc<BucketFilters>>,
    default_capacity: u32,
}

impl KeyedFilterStorage {
    pub fn new(default_capacity: u32) -> Self {
        Self {
            keys: ConcurrentMap::new(),
            default_capacity,
        }
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    /// Exposed for [`super::helper`], which needs to hold several keys'
    /// locks at once to make a whole request group atomic.
    pub(crate) fn bucket_filters_for(&self, canonical_key: &str) -> Arc<BucketFilters> {
        match self.keys.find(&canonical_key.to_string()) {
            Ok(existing) => existing,
            Err(MapError::NotFound) => {
                let fresh: Arc<BucketFilters> = Arc::new(Mutex::new(HashMap::new()));
                match self.keys.insert(canonical_key.to_string(), fresh.clone()) {
                    Ok(()) => fresh,
                    // Another thread raced us and won; use theirs.
                    Err(MapError::KeyExists) => self
                        .keys
                        .find(&canonical_key.to_string())
                        .expect("racing insert must have populated the key"),
                    Err(MapError::NotFound) => unreachable!(),
                }
            }
            Err(MapError::KeyExists) => unreachable!("find never returns KeyExists"),
        }
    }

    /// Locks the given key's bucket map and runs `op` against the filter for
    /// `time_bucket`, creating it with the default capacity on first access.
    pub fn with_filter<R>(
        &self,
        canonical_key: &str,
        time_bucket: u64,
        op: impl FnOnce(&mut TokenFilter) -> R,
    ) -> R {
        let buckets = self.bucket_filters_for(canonical_key);
        let mut buckets = buckets.lock().expect("bucket filter mutex poisoned");
        let filter = buckets
            .entry(time_bucket)
            .or_insert_with(|| TokenFilter::new(self.default_capacity));
        op(filter)
    }

    /// Locks the given key's bucket map for the duration of `op`, without
    /// pinning to one time bucket. Used by the consumption helper to hold a
    /// single lock across a dry-run check and commit for several buckets of
    /// the same key in one request.
    pub fn with_key_locked<R>(
        &self,
        canonical_key: &str,
        op: impl FnOnce(&mut HashMap<u64, TokenFilter>) -> R,
    ) -> R {
        let buckets = self.bucket_filters_for(canonical_key);
        let mut buckets = buckets.lock().expect("bucket filter mutex poisoned");
        op(&mut buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_created_lazily_with_default_capacity() {
        let storage = KeyedFilterStorage::new(10);
        let remaining = storage.with_filter("origin/key", 1, |f| f.remaining_budget());
        assert_eq!(remaining, 10);
    }

    #[test]
    fn distinct_time_buckets_get_independent_filters() {
        let storage = KeyedFilterStorage::new(5);
        storage.with_filter("origin/key", 1, |f| f.try_consume(5).unwrap());
        let other_bucket = storage.with_filter("origin/key", 2, |f| f.remaining_budget());
        assert_eq!(other_bucket, 5);
    }

    #[test]
    fn same_key_same_bucket_shares_state_across_calls() {
        let storage = KeyedFilterStorage::new(5);
        storage.with_filter("origin/key", 1, |f| f.try_consume(3).unwrap());
        let remaining = storage.with_filter("origin/key", 1, |f| f.remaining_budget());
        assert_eq!(remaining, 2);
    }
}
