//! Partition handles and the manifest built from them.

use std::ops::Index;
use std::sync::{Arc, Weak};

use atoll_rpc::Locality;
use atoll_store::MemoryPartition;
use atoll_types::{LocalityId, ManifestEntry, ManifestSnapshot, ShardId};

use crate::Key;
use crate::error::MapError;

/// How a partition is reached from this process.
pub(crate) enum PartitionAccess<K, V> {
    /// Hosted here: call the storage engine directly.
    ///
    /// The hosting locality owns the partition; the handle only borrows it.
    Local(Weak<MemoryPartition<K, V>>),
    /// Hosted elsewhere: go through the invocation substrate.
    Remote,
}

/// One partition of a map.
pub struct PartitionHandle<K, V> {
    shard_id: ShardId,
    locality: LocalityId,
    pub(crate) access: PartitionAccess<K, V>,
}

impl<K, V> PartitionHandle<K, V> {
    /// Cluster-wide identity of the partition's component.
    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Locality hosting the partition.
    pub fn locality(&self) -> LocalityId {
        self.locality
    }

    /// Whether operations on this partition take the in-process path.
    pub fn is_local(&self) -> bool {
        matches!(self.access, PartitionAccess::Local(_))
    }

    /// Wire form of this handle.
    pub fn entry(&self) -> ManifestEntry {
        ManifestEntry {
            shard_id: self.shard_id,
            locality: self.locality,
        }
    }
}

/// Ordered partitions of one map. Immutable once built; replaced wholesale.
pub struct Manifest<K, V> {
    partitions: Vec<PartitionHandle<K, V>>,
}

impl<K, V> Manifest<K, V>
where
    K: Key,
    V: crate::Value,
{
    /// Build a manifest from its wire form as seen by `locality`.
    ///
    /// Entries hosted by `locality` get a direct pointer to their partition;
    /// everything else is reached remotely.
    pub fn attach(locality: &Locality, snapshot: &ManifestSnapshot) -> Result<Self, MapError> {
        let here = locality.find_here();
        let mut partitions = Vec::with_capacity(snapshot.len());
        for entry in &snapshot.entries {
            let access = if entry.locality == here {
                let partition: Arc<MemoryPartition<K, V>> =
                    locality.resolve_local(entry.shard_id)?;
                PartitionAccess::Local(Arc::downgrade(&partition))
            } else {
                PartitionAccess::Remote
            };
            partitions.push(PartitionHandle {
                shard_id: entry.shard_id,
                locality: entry.locality,
                access,
            });
        }
        Ok(Self { partitions })
    }
}

impl<K, V> Manifest<K, V> {
    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether there are no partitions.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Iterate partitions in partition-number order.
    pub fn iter(&self) -> std::slice::Iter<'_, PartitionHandle<K, V>> {
        self.partitions.iter()
    }

    /// Wire form: `(shard, locality)` pairs, without local pointers.
    pub fn snapshot(&self) -> ManifestSnapshot {
        ManifestSnapshot::new(self.partitions.iter().map(PartitionHandle::entry).collect())
    }

    /// Shard ids grouped by hosting locality, localities in first-seen order.
    pub fn shards_by_locality(&self) -> Vec<(LocalityId, Vec<ShardId>)> {
        let mut groups: Vec<(LocalityId, Vec<ShardId>)> = Vec::new();
        for handle in &self.partitions {
            match groups.iter_mut().find(|(loc, _)| *loc == handle.locality) {
                Some((_, ids)) => ids.push(handle.shard_id),
                None => groups.push((handle.locality, vec![handle.shard_id])),
            }
        }
        groups
    }
}

impl<K, V> Index<usize> for Manifest<K, V> {
    type Output = PartitionHandle<K, V>;

    fn index(&self, part: usize) -> &Self::Output {
        &self.partitions[part]
    }
}

impl<K, V> std::fmt::Debug for Manifest<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.partitions
                    .iter()
                    .map(|p| (p.locality, p.shard_id, p.is_local())),
            )
            .finish()
    }
}
