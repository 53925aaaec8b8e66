//! Shared types and identifiers for atoll.
//!
//! This crate defines the core types used across the atoll workspace:
//! identifiers ([`ShardId`], [`LocalityId`]), the wire layout of a
//! partition manifest ([`ManifestEntry`], [`ManifestSnapshot`]), the
//! creation-time [`DistributionPolicy`], and the [`DefaultKeyHasher`] used to
//! route keys to partitions.

use std::fmt;
use std::hash::{BuildHasherDefault, DefaultHasher};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form: ids are random enough that 8 bytes identify them in logs.
                for byte in &self.0[..8] {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ")")
            }
        }
    };
}

define_id!(
    /// Cluster-wide identity of one shard (a partition component).
    ///
    /// Minted by the hosting locality when the shard is created or copied.
    ShardId
);

impl ShardId {
    /// Mint the id of the `seq`-th component created on `locality`.
    pub fn mint(locality: LocalityId, seq: u64) -> Self {
        let mut input = [0u8; 12];
        input[..4].copy_from_slice(&locality.0.to_le_bytes());
        input[4..].copy_from_slice(&seq.to_le_bytes());
        Self::from_data(&input)
    }
}

/// Identifier of a process (locality) able to host shards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LocalityId(u32);

impl LocalityId {
    /// Sentinel for a locality that has not been resolved yet.
    pub const INVALID: LocalityId = LocalityId(u32::MAX);

    /// The root locality, which hosts the name service.
    pub const ROOT: LocalityId = LocalityId(0);

    /// Create a locality id from its raw number.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this id refers to an actual locality.
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for LocalityId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<u32> for LocalityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "L{}", self.0)
        } else {
            write!(f, "L?")
        }
    }
}

impl fmt::Debug for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalityId({self})")
    }
}

// ---------------------------------------------------------------------------
// Manifest wire layout
// ---------------------------------------------------------------------------

/// One partition as it is published and transferred: identity plus host.
///
/// In-process fast-access pointers are never part of this representation;
/// every process recomputes them after loading a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Identity of the shard component.
    pub shard_id: ShardId,
    /// Locality hosting the shard.
    pub locality: LocalityId,
}

/// Ordered list of partitions; the index of an entry is its partition number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSnapshot {
    /// Partition entries in partition-number order.
    pub entries: Vec<ManifestEntry>,
}

impl ManifestSnapshot {
    /// Build a snapshot from entries in partition order.
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no partitions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct localities referenced, in first-seen order.
    pub fn localities(&self) -> Vec<LocalityId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.locality) {
                seen.push(entry.locality);
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Distribution policy
// ---------------------------------------------------------------------------

/// Creation-time placement: target localities and desired partition count.
///
/// An empty locality list means "the creating process only".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPolicy {
    localities: Vec<LocalityId>,
    num_partitions: usize,
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self {
            localities: Vec::new(),
            num_partitions: 1,
        }
    }
}

impl DistributionPolicy {
    /// Single partition on the creating locality.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spread partitions over the given localities.
    pub fn with_localities(mut self, localities: impl IntoIterator<Item = LocalityId>) -> Self {
        self.localities = localities.into_iter().collect();
        self
    }

    /// Request `n` partitions in total. Zero is raised to one.
    pub fn with_partitions(mut self, n: usize) -> Self {
        self.num_partitions = n.max(1);
        self
    }

    /// Target localities (may be empty).
    pub fn localities(&self) -> &[LocalityId] {
        &self.localities
    }

    /// Requested partition count, never less than one.
    pub fn num_partitions(&self) -> usize {
        self.num_partitions.max(1)
    }

    /// Partitions created on each of `num_localities` localities.
    ///
    /// Rounds up, so the total may exceed [`num_partitions`](Self::num_partitions).
    pub fn partitions_per_locality(&self, num_localities: usize) -> usize {
        if num_localities == 0 {
            return self.num_partitions();
        }
        self.num_partitions().div_ceil(num_localities)
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Key hasher used for routing unless the caller supplies one.
///
/// Deterministic: unlike `RandomState`, every process computes the same hash
/// for the same key, so all localities attached to one manifest agree on
/// where a key lives.
pub type DefaultKeyHasher = BuildHasherDefault<DefaultHasher>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
