//! Shared test utilities for atoll-map tests.

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use atoll_rpc::{ComponentRegistry, Locality, LoopbackNetwork};
use atoll_types::{DistributionPolicy, LocalityId};

use crate::map::UnorderedMap;

pub type StringMap = UnorderedMap<String, u64>;

/// Registry with every partition type the tests use.
pub fn registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with_partition::<String, u64>()
        .with_partition::<u64, String>()
}

/// `n` localities on a zero-latency loopback network. Locality 0 is root.
pub fn cluster(n: u32) -> (Arc<LoopbackNetwork>, Vec<Arc<Locality>>) {
    let network = LoopbackNetwork::new().into_shared();
    let localities = network.spawn_localities(n, registry());
    (network, localities)
}

/// Like [`cluster`] but every remote call sleeps 1-5 ms.
pub fn slow_cluster(n: u32, seed: u64) -> (Arc<LoopbackNetwork>, Vec<Arc<Locality>>) {
    let network = LoopbackNetwork::new().latency(1, 5).seed(seed).into_shared();
    let localities = network.spawn_localities(n, registry());
    (network, localities)
}

/// Policy spreading `partitions` over every locality in `localities`.
pub fn spread(localities: &[Arc<Locality>], partitions: usize) -> DistributionPolicy {
    DistributionPolicy::new()
        .with_localities(localities.iter().map(|l| l.find_here()))
        .with_partitions(partitions)
}

/// Policy placing `partitions` on the listed locality ids.
pub fn on(ids: &[u32], partitions: usize) -> DistributionPolicy {
    DistributionPolicy::new()
        .with_localities(ids.iter().map(|&n| LocalityId::new(n)))
        .with_partitions(partitions)
}

/// Hasher that hashes an integer key to itself, so `partition_of(k)` is
/// `k mod partitions`.
#[derive(Debug, Clone, Default)]
pub struct IdentityHasher;

impl BuildHasher for IdentityHasher {
    type Hasher = IdentityState;

    fn build_hasher(&self) -> IdentityState {
        IdentityState(0)
    }
}

pub struct IdentityState(u64);

impl Hasher for IdentityState {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}
