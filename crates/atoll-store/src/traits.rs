//! Core trait for partition storage.

use crate::error::StoreError;

/// Storage engine of a single partition.
///
/// Calls are synchronous: the engine is invoked directly on the fast path and
/// from the locality's request dispatcher on the remote path. Implementations
/// serialize operations against the same key; nothing is promised across
/// distinct keys.
pub trait PartitionStore<K, V>: Send + Sync {
    /// Look up `key`. When `erase` is set the entry is removed in the same
    /// step and its prior value returned.
    fn get_value(&self, key: &K, erase: bool) -> Result<Option<V>, StoreError>;

    /// Insert or overwrite the value stored under `key`.
    fn set_value(&self, key: K, value: V) -> Result<(), StoreError>;

    /// Remove every entry stored under `key`, returning how many were removed.
    fn erase(&self, key: &K) -> Result<usize, StoreError>;

    /// Number of entries currently held.
    fn size(&self) -> usize;
}
