//! Deferred element access.

use std::hash::BuildHasher;

use crate::error::MapError;
use crate::map::UnorderedMap;
use crate::{Key, Value};

/// Stands for the element of a map under one key.
///
/// Holds the key and a borrow of the map; every [`get`](Self::get) fetches
/// afresh and every [`set`](Self::set) stores afresh. Returned by
/// [`UnorderedMap::at`].
pub struct ValueProxy<'a, K, V, S> {
    map: &'a UnorderedMap<K, V, S>,
    key: K,
}

impl<'a, K, V, S> ValueProxy<'a, K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(map: &'a UnorderedMap<K, V, S>, key: K) -> Self {
        Self { map, key }
    }

    /// The key this proxy stands for.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Read the current value, blocking.
    pub fn get(&self) -> Result<Option<V>, MapError> {
        self.map.get_value_sync(&self.key, false)
    }

    /// Store `value`, blocking. Returns the proxy so writes can be chained.
    pub fn set(&self, value: V) -> Result<&Self, MapError> {
        self.map.set_value_sync(self.key.clone(), value)?;
        Ok(self)
    }
}

impl<K: std::fmt::Debug, V, S> std::fmt::Debug for ValueProxy<'_, K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueProxy").field("key", &self.key).finish()
    }
}
