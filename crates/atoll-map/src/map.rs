//! The user-facing distributed map.

use std::future::Future;
use std::hash::BuildHasher;
use std::sync::Arc;

use atoll_rpc::{Locality, RpcError, from_wire, partition_type_name, to_wire};
use atoll_store::PartitionStore;
use atoll_types::{
    DefaultKeyHasher, DistributionPolicy, LocalityId, ManifestEntry, ManifestSnapshot, ShardId,
};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use crate::error::MapError;
use crate::future::MapFuture;
use crate::manifest::{Manifest, PartitionAccess};
use crate::proxy::ValueProxy;
use crate::router::Router;
use crate::{Key, Value};

/// A hash map whose entries are spread over partitions hosted by many
/// localities.
///
/// Every operation routes its key to a partition with `hash(key) mod
/// num_partitions`. Partitions hosted by the calling locality are accessed
/// directly; the rest are reached through the [`Locality`]'s transport.
///
/// Each operation comes in two forms sharing one dispatch path: a method
/// returning a [`MapFuture`] and a blocking `_sync` twin.
///
/// Dropping a map that registered a name unregisters it. Failures there are
/// logged and otherwise ignored.
pub struct UnorderedMap<K, V, S = DefaultKeyHasher> {
    locality: Arc<Locality>,
    manifest: Arc<Manifest<K, V>>,
    router: Router<S>,
    registered_name: Option<String>,
    runtime: Handle,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl<K, V, S> UnorderedMap<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// A map with one partition on the calling locality.
    pub async fn create(locality: Arc<Locality>) -> Result<Self, MapError>
    where
        S: Default,
    {
        Self::create_with(locality, &DistributionPolicy::default(), None, S::default()).await
    }

    /// A map laid out according to `policy`.
    ///
    /// Each target locality receives `ceil(partitions / localities)`
    /// partitions, so the result may hold slightly more partitions than
    /// requested. An empty locality list means the calling locality.
    ///
    /// If any locality fails to create its partitions, the partitions created
    /// elsewhere are destroyed before the error is returned.
    pub async fn create_with(
        locality: Arc<Locality>,
        policy: &DistributionPolicy,
        bucket_count: Option<usize>,
        hasher: S,
    ) -> Result<Self, MapError> {
        let runtime = Handle::try_current().map_err(|_| MapError::NoRuntime)?;

        let targets: Vec<LocalityId> = if policy.localities().is_empty() {
            vec![locality.find_here()]
        } else {
            policy.localities().to_vec()
        };
        let per_locality = policy.partitions_per_locality(targets.len());
        let count = u32::try_from(per_locality)
            .map_err(|_| MapError::TooManyPartitions { per_locality })?;
        let type_name = partition_type_name::<K, V>();

        // Fan out one bulk creation per locality before waiting on any.
        let mut handles = Vec::with_capacity(targets.len());
        for &target in &targets {
            let locality = Arc::clone(&locality);
            let type_name = type_name.clone();
            handles.push(runtime.spawn(async move {
                let ids = locality
                    .bulk_create(target, &type_name, count, bucket_count)
                    .await;
                (target, ids)
            }));
        }

        let mut entries = Vec::with_capacity(targets.len() * per_locality);
        let mut failure: Option<MapError> = None;
        for handle in handles {
            match handle.await {
                Ok((target, Ok(ids))) => entries.extend(ids.into_iter().map(|shard_id| {
                    ManifestEntry {
                        shard_id,
                        locality: target,
                    }
                })),
                Ok((target, Err(e))) => {
                    warn!(locality = %target, error = %e, "partition creation failed");
                    failure.get_or_insert(e.into());
                }
                Err(e) => {
                    failure.get_or_insert(e.into());
                }
            }
        }

        let snapshot = ManifestSnapshot::new(entries);
        let manifest = match failure {
            None => Manifest::attach(&locality, &snapshot),
            Some(e) => Err(e),
        };
        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(e) => {
                destroy_all(&runtime, &locality, &snapshot.entries).await;
                return Err(e);
            }
        };

        info!(
            here = %locality.find_here(),
            partitions = manifest.len(),
            localities = targets.len(),
            "created map"
        );
        Ok(Self {
            locality,
            manifest: Arc::new(manifest),
            router: Router::new(hasher),
            registered_name: None,
            runtime,
        })
    }

    /// Attach to the map registered under `name`.
    pub async fn connect_to(locality: Arc<Locality>, name: &str) -> Result<Self, MapError>
    where
        S: Default,
    {
        Self::connect_to_with(locality, name, S::default()).await
    }

    /// Attach to the map registered under `name`, routing with `hasher`.
    ///
    /// `hasher` must route keys the same way as the hasher of the map that
    /// registered the name.
    pub async fn connect_to_with(
        locality: Arc<Locality>,
        name: &str,
        hasher: S,
    ) -> Result<Self, MapError> {
        let runtime = Handle::try_current().map_err(|_| MapError::NoRuntime)?;
        let manifest = resolve_manifest(&locality, name).await?;
        Ok(Self {
            locality,
            manifest: Arc::new(manifest),
            router: Router::new(hasher),
            registered_name: None,
            runtime,
        })
    }

    /// Publish this map's manifest under `name`.
    ///
    /// On success this map becomes responsible for the binding and removes
    /// it when dropped. A name registered earlier by this map is released.
    pub async fn register_as(&mut self, name: &str) -> Result<(), MapError> {
        self.locality
            .register_name(name, self.manifest.snapshot())
            .await?;
        info!(%name, partitions = self.manifest.len(), "registered map");
        if let Some(previous) = self.registered_name.replace(name.to_string()) {
            release_name(&self.locality, &previous).await;
        }
        Ok(())
    }

    /// Replace this map's manifest with the one registered under `name`.
    ///
    /// The name this map registered itself, if any, stays bound.
    pub async fn connect(&mut self, name: &str) -> Result<(), MapError> {
        let manifest = resolve_manifest(&self.locality, name).await?;
        self.manifest = Arc::new(manifest);
        Ok(())
    }

    /// Deep copy: every partition is duplicated on the locality hosting it.
    ///
    /// The copy is not registered under any name.
    pub async fn duplicate(&self) -> Result<Self, MapError> {
        let manifest = duplicate_manifest(&self.manifest, &self.locality, &self.runtime).await?;
        Ok(Self {
            locality: Arc::clone(&self.locality),
            manifest: Arc::new(manifest),
            router: self.router.clone(),
            registered_name: None,
            runtime: self.runtime.clone(),
        })
    }

    /// Blocking form of [`duplicate`](Self::duplicate).
    pub fn duplicate_sync(&self) -> Result<Self, MapError> {
        let runtime = self.runtime.clone();
        wait_on(&runtime, self.duplicate())
    }

    /// Make this map a deep copy of `other`.
    ///
    /// The copies are attached from this map's locality, which may differ
    /// from `other`'s. The name this map registered, if any, is unregistered.
    pub async fn clone_from_map(&mut self, other: &Self) -> Result<(), MapError> {
        let manifest = duplicate_manifest(&other.manifest, &self.locality, &self.runtime).await?;
        if let Some(name) = self.registered_name.take() {
            release_name(&self.locality, &name).await;
        }
        self.manifest = Arc::new(manifest);
        self.router = other.router.clone();
        Ok(())
    }

}

// ---------------------------------------------------------------------------
// Element access
// ---------------------------------------------------------------------------

impl<K, V, S> UnorderedMap<K, V, S>
where
    K: Key,
    V: Value,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Look up `key`. With `erase` set, the entry is removed in the same step
    /// and its prior value returned.
    pub fn get_value(&self, key: &K, erase: bool) -> MapFuture<Option<V>> {
        self.get_value_at(self.partition_of(key), key, erase)
    }

    /// Blocking form of [`get_value`](Self::get_value).
    pub fn get_value_sync(&self, key: &K, erase: bool) -> Result<Option<V>, MapError> {
        self.wait(self.get_value(key, erase))
    }

    /// [`get_value`](Self::get_value) on an explicit partition, bypassing
    /// routing.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn get_value_at(&self, part: usize, key: &K, erase: bool) -> MapFuture<Option<V>> {
        self.check_partition(part);
        let handle = &self.manifest[part];
        debug!(part, shard = %handle.shard_id(), local = handle.is_local(), erase, "get_value");
        match &handle.access {
            PartitionAccess::Local(partition) => MapFuture::ready(match partition.upgrade() {
                Some(p) => p.get_value(key, erase).map_err(MapError::from),
                None => Err(MapError::PartitionGone { part }),
            }),
            PartitionAccess::Remote => self.spawn(remote_get(
                Arc::clone(&self.locality),
                handle.locality(),
                handle.shard_id(),
                key.clone(),
                erase,
            )),
        }
    }

    /// Blocking form of [`get_value_at`](Self::get_value_at).
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn get_value_at_sync(
        &self,
        part: usize,
        key: &K,
        erase: bool,
    ) -> Result<Option<V>, MapError> {
        self.wait(self.get_value_at(part, key, erase))
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set_value(&self, key: K, value: V) -> MapFuture<()> {
        self.set_value_at(self.partition_of(&key), key, value)
    }

    /// Blocking form of [`set_value`](Self::set_value).
    pub fn set_value_sync(&self, key: K, value: V) -> Result<(), MapError> {
        self.wait(self.set_value(key, value))
    }

    /// [`set_value`](Self::set_value) on an explicit partition.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn set_value_at(&self, part: usize, key: K, value: V) -> MapFuture<()> {
        self.check_partition(part);
        let handle = &self.manifest[part];
        debug!(part, shard = %handle.shard_id(), local = handle.is_local(), "set_value");
        match &handle.access {
            PartitionAccess::Local(partition) => MapFuture::ready(match partition.upgrade() {
                Some(p) => p.set_value(key, value).map_err(MapError::from),
                None => Err(MapError::PartitionGone { part }),
            }),
            PartitionAccess::Remote => self.spawn(remote_set(
                Arc::clone(&self.locality),
                handle.locality(),
                handle.shard_id(),
                key,
                value,
            )),
        }
    }

    /// Blocking form of [`set_value_at`](Self::set_value_at).
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn set_value_at_sync(&self, part: usize, key: K, value: V) -> Result<(), MapError> {
        self.wait(self.set_value_at(part, key, value))
    }

    /// Remove `key`, returning how many entries were removed.
    pub fn erase(&self, key: &K) -> MapFuture<usize> {
        self.erase_at(self.partition_of(key), key)
    }

    /// Blocking form of [`erase`](Self::erase).
    pub fn erase_sync(&self, key: &K) -> Result<usize, MapError> {
        self.wait(self.erase(key))
    }

    /// [`erase`](Self::erase) on an explicit partition.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn erase_at(&self, part: usize, key: &K) -> MapFuture<usize> {
        self.check_partition(part);
        let handle = &self.manifest[part];
        debug!(part, shard = %handle.shard_id(), local = handle.is_local(), "erase");
        match &handle.access {
            PartitionAccess::Local(partition) => MapFuture::ready(match partition.upgrade() {
                Some(p) => p.erase(key).map_err(MapError::from),
                None => Err(MapError::PartitionGone { part }),
            }),
            PartitionAccess::Remote => self.spawn(remote_erase(
                Arc::clone(&self.locality),
                handle.locality(),
                handle.shard_id(),
                key.clone(),
            )),
        }
    }

    /// Blocking form of [`erase_at`](Self::erase_at).
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn erase_at_sync(&self, part: usize, key: &K) -> Result<usize, MapError> {
        self.wait(self.erase_at(part, key))
    }

    /// Total number of entries across all partitions.
    ///
    /// Each hosting locality sums the sizes of its own partitions; the
    /// per-locality sums are requested together and then added up.
    pub fn size(&self) -> MapFuture<usize> {
        if self.manifest.is_empty() {
            return MapFuture::ready(Ok(0));
        }

        if self.manifest.iter().all(|p| p.is_local()) {
            let mut total = 0;
            for (part, handle) in self.manifest.iter().enumerate() {
                let PartitionAccess::Local(partition) = &handle.access else {
                    continue;
                };
                match partition.upgrade() {
                    Some(p) => total += p.size(),
                    None => return MapFuture::ready(Err(MapError::PartitionGone { part })),
                }
            }
            return MapFuture::ready(Ok(total));
        }

        self.spawn(reduce_size(
            self.runtime.clone(),
            Arc::clone(&self.locality),
            self.manifest.shards_by_locality(),
        ))
    }

    /// Blocking form of [`size`](Self::size).
    pub fn size_sync(&self) -> Result<usize, MapError> {
        self.wait(self.size())
    }

    /// A proxy for the element under `key`.
    ///
    /// Nothing is fetched until the proxy is read or written.
    pub fn at(&self, key: K) -> ValueProxy<'_, K, V, S> {
        ValueProxy::new(self, key)
    }

    /// Read the value under `key` directly, blocking.
    pub fn value_of(&self, key: &K) -> Result<Option<V>, MapError> {
        self.get_value_sync(key, false)
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

impl<K, V, S: BuildHasher> UnorderedMap<K, V, S> {
    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.manifest.len()
    }

    /// Partition number `key` routes to.
    pub fn partition_of(&self, key: &K) -> usize
    where
        K: std::hash::Hash,
    {
        self.router.partition_of(key, self.manifest.len())
    }

    /// Locality hosting partition `part`.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn locality_of(&self, part: usize) -> LocalityId {
        self.check_partition(part);
        self.manifest[part].locality()
    }

    /// Shard id of partition `part`.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn shard_of(&self, part: usize) -> ShardId {
        self.check_partition(part);
        self.manifest[part].shard_id()
    }

    /// Whether partition `part` is accessed in-process.
    ///
    /// # Panics
    ///
    /// If `part` is not a partition number of this map.
    pub fn is_local(&self, part: usize) -> bool {
        self.check_partition(part);
        self.manifest[part].is_local()
    }

    /// Wire form of the manifest.
    pub fn snapshot(&self) -> ManifestSnapshot {
        self.manifest.snapshot()
    }

    /// The name this map registered, if any.
    pub fn registered_name(&self) -> Option<&str> {
        self.registered_name.as_deref()
    }

    /// The locality this map operates from.
    pub fn locality(&self) -> &Arc<Locality> {
        &self.locality
    }

    fn check_partition(&self, part: usize) {
        assert!(
            part < self.manifest.len(),
            "partition index {part} out of range for map with {} partitions",
            self.manifest.len()
        );
    }

    fn spawn<T, F>(&self, fut: F) -> MapFuture<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, MapError>> + Send + 'static,
    {
        MapFuture::Spawned(self.runtime.spawn(fut))
    }

    fn wait<T>(&self, fut: MapFuture<T>) -> Result<T, MapError> {
        match fut {
            MapFuture::Ready(Some(result)) => result,
            fut => wait_on(&self.runtime, fut),
        }
    }
}

impl<K, V, S> Drop for UnorderedMap<K, V, S> {
    fn drop(&mut self) {
        let Some(name) = self.registered_name.take() else {
            return;
        };

        if self.locality.server().hosts_names() {
            match self.locality.server().unregister_name(&name) {
                Ok(_) => debug!(%name, "unregistered map on drop"),
                Err(e) => warn!(%name, error = %e, "failed to unregister map on drop"),
            }
            return;
        }

        let locality = Arc::clone(&self.locality);
        self.runtime.spawn(async move {
            release_name(&locality, &name).await;
        });
    }
}

impl<K, V, S> std::fmt::Debug for UnorderedMap<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnorderedMap")
            .field("here", &self.locality.find_here())
            .field("manifest", &self.manifest)
            .field("registered_name", &self.registered_name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Block the calling thread until `fut` completes.
///
/// On a multi-thread runtime worker the wait happens inside
/// `block_in_place`; on a current-thread runtime it is refused.
fn wait_on<T, F>(runtime: &Handle, fut: F) -> Result<T, MapError>
where
    F: Future<Output = Result<T, MapError>>,
{
    match Handle::try_current() {
        Ok(current) => match current.runtime_flavor() {
            RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| runtime.block_on(fut)),
            _ => Err(MapError::BlockingInAsyncContext),
        },
        Err(_) => runtime.block_on(fut),
    }
}

async fn resolve_manifest<K, V>(locality: &Locality, name: &str) -> Result<Manifest<K, V>, MapError>
where
    K: Key,
    V: Value,
{
    let snapshot = locality.resolve_name(name).await.map_err(|e| match e {
        RpcError::NameNotFound(name) => MapError::NameNotFound { name },
        other => MapError::from(other),
    })?;
    let manifest = Manifest::attach(locality, &snapshot)?;
    info!(
        %name,
        here = %locality.find_here(),
        partitions = manifest.len(),
        local = manifest.iter().filter(|p| p.is_local()).count(),
        "connected to map"
    );
    Ok(manifest)
}

/// Unregister `name`, logging instead of failing.
async fn release_name(locality: &Locality, name: &str) {
    match locality.unregister_name(name).await {
        Ok(()) => debug!(%name, "released name"),
        Err(e) => warn!(%name, error = %e, "failed to release name"),
    }
}

/// Copy every partition of `source` on its host and attach the copies
/// from `locality`.
async fn duplicate_manifest<K: Key, V: Value>(
    source: &Manifest<K, V>,
    locality: &Arc<Locality>,
    runtime: &Handle,
) -> Result<Manifest<K, V>, MapError> {
    let mut handles = Vec::with_capacity(source.len());
    for partition in source.iter() {
        let locality = Arc::clone(locality);
        let (on, shard_id) = (partition.locality(), partition.shard_id());
        handles.push(runtime.spawn(async move {
            (on, locality.copy_component(on, shard_id).await)
        }));
    }

    let mut entries = Vec::with_capacity(handles.len());
    let mut failure: Option<MapError> = None;
    for handle in handles {
        match handle.await {
            Ok((on, Ok(shard_id))) => entries.push(ManifestEntry {
                shard_id,
                locality: on,
            }),
            Ok((on, Err(e))) => {
                warn!(locality = %on, error = %e, "partition copy failed");
                failure.get_or_insert(e.into());
            }
            Err(e) => {
                failure.get_or_insert(e.into());
            }
        }
    }

    let snapshot = ManifestSnapshot::new(entries);
    let manifest = match failure {
        None => Manifest::attach(locality, &snapshot),
        Some(e) => Err(e),
    };
    match manifest {
        Ok(manifest) => {
            info!(
                here = %locality.find_here(),
                partitions = manifest.len(),
                "duplicated map"
            );
            Ok(manifest)
        }
        Err(e) => {
            destroy_all(runtime, locality, &snapshot.entries).await;
            Err(e)
        }
    }
}

/// Destroy every listed shard, logging failures.
async fn destroy_all(runtime: &Handle, locality: &Arc<Locality>, entries: &[ManifestEntry]) {
    if entries.is_empty() {
        return;
    }
    info!(shards = entries.len(), "rolling back partially built map");
    let mut handles = Vec::with_capacity(entries.len());
    for entry in entries.iter().copied() {
        let locality = Arc::clone(locality);
        handles.push(runtime.spawn(async move {
            (
                entry,
                locality
                    .destroy_component(entry.locality, entry.shard_id)
                    .await,
            )
        }));
    }
    for handle in handles {
        match handle.await {
            Ok((_, Ok(()))) => {}
            Ok((entry, Err(e))) => warn!(
                shard = %entry.shard_id,
                locality = %entry.locality,
                error = %e,
                "failed to destroy shard during rollback"
            ),
            Err(e) => warn!(error = %e, "rollback task failed"),
        }
    }
}

async fn remote_get<K: Key, V: Value>(
    locality: Arc<Locality>,
    on: LocalityId,
    shard_id: ShardId,
    key: K,
    erase: bool,
) -> Result<Option<V>, MapError> {
    let key = to_wire(&key)?;
    let value = locality.get_value(on, shard_id, key, erase).await?;
    match value {
        Some(bytes) => Ok(Some(from_wire(&bytes)?)),
        None => Ok(None),
    }
}

async fn remote_set<K: Key, V: Value>(
    locality: Arc<Locality>,
    on: LocalityId,
    shard_id: ShardId,
    key: K,
    value: V,
) -> Result<(), MapError> {
    let key = to_wire(&key)?;
    let value = to_wire(&value)?;
    locality.set_value(on, shard_id, key, value).await?;
    Ok(())
}

async fn remote_erase<K: Key>(
    locality: Arc<Locality>,
    on: LocalityId,
    shard_id: ShardId,
    key: K,
) -> Result<usize, MapError> {
    let key = to_wire(&key)?;
    Ok(locality.erase(on, shard_id, key).await? as usize)
}

/// Sum of per-locality partition sizes, requested concurrently.
async fn reduce_size(
    runtime: Handle,
    locality: Arc<Locality>,
    groups: Vec<(LocalityId, Vec<ShardId>)>,
) -> Result<usize, MapError> {
    let mut handles = Vec::with_capacity(groups.len());
    for (on, shard_ids) in groups {
        let locality = Arc::clone(&locality);
        handles.push(runtime.spawn(async move {
            locality.size_of(on, shard_ids).await
        }));
    }

    let mut total = 0u64;
    for handle in handles {
        total += handle.await??;
    }
    Ok(total as usize)
}
