//! Keyed, fine-grained-locking concurrent map. See spec §4.2.
//!
//! Implemented as a fixed set of shards, each guarded by its own `Mutex`, so
//! that operations on keys that hash to different shards never contend on
//! the same lock. This is the same sharding trick as the teacher's
//! `HashMapFilterStorage`, generalized from "one lock for the whole map" to
//! "one lock per shard".

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("key already exists")]
    KeyExists,
    #[error("key not found")]
    NotFound,
}

const DEFAULT_SHARD_COUNT: usize = 16;

pub struct ConcurrentMap<K, V> {
    shards: Vec<Mutex<HashMap<K, V>>>,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARD_COUNT)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(Mutex::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, key: &K) -> &Mutex<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Strict upsert-prevention insert: if `key` already maps to a value, no
    /// mutation occurs and `MapError::KeyExists` is returned.
    pub fn insert(&self, key: K, value: V) -> Result<(), MapError> {
        let mut shard = self.shard_for(&key).lock().expect("map shard poisoned");
        if shard.contains_key(&key) {
            return Err(MapError::KeyExists);
        }
        shard.insert(key, value);
        Ok(())
    }

    pub fn find(&self, key: &K) -> Result<V, MapError> {
        let shard = self.shard_for(key).lock().expect("map shard poisoned");
        shard.get(key).cloned().ok_or(MapError::NotFound)
    }

    pub fn erase(&self, key: &K) -> Result<(), MapError> {
        let mut shard = self.shard_for(key).lock().expect("map shard poisoned");
        shard.remove(key).map(|_| ()).ok_or(MapError::NotFound)
    }

    /// Point-in-time snapshot of every key currently present. Order is
    /// unspecified; concurrent mutations after the snapshot are not
    /// reflected, per spec §4.2.
    pub fn keys(&self) -> Vec<K> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock().expect("map shard poisoned");
            out.extend(shard.keys().cloned());
        }
        out
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_prevents_upsert() {
        let m: ConcurrentMap<&str, u32> = ConcurrentMap::new();
        assert!(m.insert("a", 1).is_ok());
        assert_eq!(m.insert("a", 2), Err(MapError::KeyExists));
        assert_eq!(m.find(&"a").unwrap(), 1);
    }

    #[test]
    fn find_missing_key_returns_not_found() {
        let m: ConcurrentMap<&str, u32> = ConcurrentMap::new();
        assert_eq!(m.find(&"missing"), Err(MapError::NotFound));
    }

    #[test]
    fn erase_removes_key() {
        let m: ConcurrentMap<&str, u32> = ConcurrentMap::new();
        m.insert("a", 1).unwrap();
        assert!(m.erase(&"a").is_ok());
        assert_eq!(m.find(&"a"), Err(MapError::NotFound));
        assert_eq!(m.erase(&"a"), Err(MapError::NotFound));
    }

    #[test]
    fn keys_snapshot_contains_two_element_set_unordered() {
        let m: ConcurrentMap<&str, u32> = ConcurrentMap::new();
        m.insert("a", 1).unwrap();
        m.insert("b", 2).unwrap();
        let keys: HashSet<_> = m.keys().into_iter().collect();
        assert_eq!(keys, HashSet::from(["a", "b"]));
    }

    #[test]
    fn concurrent_inserts_on_distinct_keys_all_succeed() {
        let m = Arc::new(ConcurrentMap::<u32, u32>::new());
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let m = m.clone();
                thread::spawn(move || m.insert(i, i * 2))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }
        for i in 0..50 {
            assert_eq!(m.find(&i).unwrap(), i * 2);
        }
    }
}
