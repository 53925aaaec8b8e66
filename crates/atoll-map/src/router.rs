//! Key to partition routing.

use std::hash::{BuildHasher, Hash};

/// Maps a key to a partition number: `hash(key) mod partitions`.
#[derive(Debug, Clone, Default)]
pub struct Router<S> {
    hasher: S,
}

impl<S: BuildHasher> Router<S> {
    /// Route with the given hasher.
    pub fn new(hasher: S) -> Self {
        Self { hasher }
    }

    /// The hasher in use.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Partition number of `key` among `num_partitions` partitions.
    ///
    /// # Panics
    ///
    /// If `num_partitions` is zero.
    pub fn partition_of<Q: Hash + ?Sized>(&self, key: &Q, num_partitions: usize) -> usize {
        assert!(num_partitions > 0, "routing over zero partitions");
        (self.hasher.hash_one(key) % num_partitions as u64) as usize
    }
}
