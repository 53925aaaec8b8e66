//! Type-erased components and the registry that constructs them.
//!
//! A locality only ever sees components through [`ShardComponent`], which
//! speaks encoded keys and values. The concrete partition type is recovered
//! on the fast path with [`ShardComponent::into_any`] and a downcast.

use std::any::Any;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use atoll_store::{MemoryPartition, PartitionStore};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RpcError;
use crate::message::{from_wire, to_wire};

/// A component hosted by a locality, addressed by encoded keys.
pub trait ShardComponent: Send + Sync + 'static {
    /// Look up an encoded key, optionally removing it.
    fn get_raw(&self, key: &[u8], erase: bool) -> Result<Option<Vec<u8>>, RpcError>;

    /// Insert or overwrite an encoded key.
    fn set_raw(&self, key: &[u8], value: &[u8]) -> Result<(), RpcError>;

    /// Remove an encoded key, returning how many entries went away.
    fn erase_raw(&self, key: &[u8]) -> Result<u64, RpcError>;

    /// Number of entries held.
    fn entry_count(&self) -> u64;

    /// Deep copy into a new, independent component.
    fn duplicate_component(&self) -> Arc<dyn ShardComponent>;

    /// Recover the concrete type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K, V, S> ShardComponent for MemoryPartition<K, V, S>
where
    K: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn get_raw(&self, key: &[u8], erase: bool) -> Result<Option<Vec<u8>>, RpcError> {
        let key: K = from_wire(key)?;
        let value = PartitionStore::get_value(self, &key, erase)?;
        value.as_ref().map(to_wire).transpose()
    }

    fn set_raw(&self, key: &[u8], value: &[u8]) -> Result<(), RpcError> {
        let key: K = from_wire(key)?;
        let value: V = from_wire(value)?;
        PartitionStore::set_value(self, key, value)?;
        Ok(())
    }

    fn erase_raw(&self, key: &[u8]) -> Result<u64, RpcError> {
        let key: K = from_wire(key)?;
        Ok(PartitionStore::erase(self, &key)? as u64)
    }

    fn entry_count(&self) -> u64 {
        PartitionStore::size(self) as u64
    }

    fn duplicate_component(&self) -> Arc<dyn ShardComponent> {
        Arc::new(self.duplicate())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Name under which [`ComponentRegistry::with_partition`] registers the
/// partition type for `K`/`V`.
pub fn partition_type_name<K: 'static, V: 'static>() -> String {
    std::any::type_name::<MemoryPartition<K, V>>().to_string()
}

/// Builds a component given an initial bucket count.
pub type Constructor = Arc<dyn Fn(usize) -> Arc<dyn ShardComponent> + Send + Sync>;

/// Explicit table of constructible component types.
///
/// Populated at startup and shared read-only by every locality, so a
/// [`Request::BulkCreate`](crate::Request::BulkCreate) naming a type resolves
/// to the same constructor wherever it lands.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `type_name`, replacing any earlier one.
    pub fn register(&mut self, type_name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(type_name.into(), constructor);
    }

    /// Register the in-memory partition type for `K`/`V`.
    pub fn with_partition<K, V>(mut self) -> Self
    where
        K: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static,
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.register(
            partition_type_name::<K, V>(),
            Arc::new(|bucket_count: usize| {
                Arc::new(MemoryPartition::<K, V>::with_bucket_count(bucket_count))
                    as Arc<dyn ShardComponent>
            }),
        );
        self
    }

    /// Whether `type_name` can be constructed.
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct one component of `type_name`.
    pub fn construct(
        &self,
        type_name: &str,
        bucket_count: usize,
    ) -> Result<Arc<dyn ShardComponent>, RpcError> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| RpcError::UnknownComponentType(type_name.to_string()))?;
        Ok(constructor(bucket_count))
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
