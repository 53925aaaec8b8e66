//! In-memory partition storage engine.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::RwLock;

use atoll_types::DefaultKeyHasher;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::PartitionStore;

/// In-memory partition backed by a `RwLock<HashMap>`.
///
/// `bucket_count` sizing and the bucket hasher are fixed at construction.
/// An optional entry limit turns inserts of new keys into
/// [`StoreError::CapacityExceeded`] once reached.
pub struct MemoryPartition<K, V, S = DefaultKeyHasher> {
    entries: RwLock<HashMap<K, V, S>>,
    max_entries: Option<usize>,
}

impl<K, V> MemoryPartition<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty, unbounded partition.
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, DefaultKeyHasher::default())
    }

    /// Create an empty partition pre-sized for `bucket_count` entries.
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        Self::with_capacity_and_hasher(bucket_count, DefaultKeyHasher::default())
    }
}

impl<K, V> Default for MemoryPartition<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> MemoryPartition<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Create an empty partition with the given sizing and bucket hasher.
    pub fn with_capacity_and_hasher(bucket_count: usize, hasher: S) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity_and_hasher(bucket_count, hasher)),
            max_entries: None,
        }
    }

    /// Limit the partition to `limit` entries.
    pub fn with_max_entries(mut self, limit: usize) -> Self {
        self.max_entries = Some(limit);
        self
    }

    /// Number of entries the partition can hold without reallocating.
    pub fn bucket_capacity(&self) -> usize {
        self.entries.read().expect("lock poisoned").capacity()
    }

    /// Deep copy: a new partition with the same entries, sizing and limit.
    pub fn duplicate(&self) -> Self
    where
        K: Clone,
        V: Clone,
        S: Clone,
    {
        let map = self.entries.read().expect("lock poisoned");
        Self {
            entries: RwLock::new(map.clone()),
            max_entries: self.max_entries,
        }
    }
}

impl<K, V, S> PartitionStore<K, V> for MemoryPartition<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    S: BuildHasher + Send + Sync,
{
    fn get_value(&self, key: &K, erase: bool) -> Result<Option<V>, StoreError> {
        if erase {
            let mut map = self.entries.write().expect("lock poisoned");
            return Ok(map.remove(key));
        }
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn set_value(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.entries.write().expect("lock poisoned");
        if let Some(limit) = self.max_entries
            && map.len() >= limit
            && !map.contains_key(&key)
        {
            return Err(StoreError::CapacityExceeded { limit });
        }
        map.insert(key, value);
        debug!(entries = map.len(), "stored value in partition");
        Ok(())
    }

    fn erase(&self, key: &K) -> Result<usize, StoreError> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(usize::from(map.remove(key).is_some()))
    }

    fn size(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }
}
