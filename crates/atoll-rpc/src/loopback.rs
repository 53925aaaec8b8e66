//! In-process network connecting several localities.
//!
//! Every call goes through the full encode/dispatch/decode path and can be
//! slowed down with a seeded random latency, so multi-locality behaviour is
//! exercised without sockets. Localities can be marked unreachable to
//! inject failures.
//!
//! # Example
//!
//! ```ignore
//! let network = LoopbackNetwork::new().latency(1, 5).seed(42).into_shared();
//! let localities = network.spawn_localities(3, registry);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use atoll_types::LocalityId;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::Transport;
use crate::component::ComponentRegistry;
use crate::error::RpcError;
use crate::locality::Locality;
use crate::server::LocalityServer;

/// Shared in-process network.
pub struct LoopbackNetwork {
    servers: RwLock<HashMap<LocalityId, Arc<LocalityServer>>>,
    unreachable: RwLock<HashSet<LocalityId>>,
    latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
    calls: AtomicU64,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    /// A network with no latency.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            calls: AtomicU64::new(0),
        }
    }

    /// Per-call latency range in milliseconds (uniform random).
    pub fn latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = (min_ms, max_ms.max(min_ms));
        self
    }

    /// RNG seed for reproducible latency.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Wrap in an `Arc` so localities can share it.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Attach a locality with the given id.
    pub fn add_locality(
        self: &Arc<Self>,
        id: LocalityId,
        registry: Arc<ComponentRegistry>,
    ) -> Arc<Locality> {
        let server = Arc::new(LocalityServer::new(id, registry));
        self.servers
            .write()
            .expect("lock poisoned")
            .insert(id, server.clone());
        Arc::new(Locality::new(server, self.clone()))
    }

    /// Attach localities `0..count`, all sharing one registry.
    pub fn spawn_localities(
        self: &Arc<Self>,
        count: u32,
        registry: ComponentRegistry,
    ) -> Vec<Arc<Locality>> {
        let registry = Arc::new(registry);
        (0..count)
            .map(|n| self.add_locality(LocalityId::new(n), registry.clone()))
            .collect()
    }

    /// Make calls to `id` fail (or succeed again).
    pub fn set_reachable(&self, id: LocalityId, reachable: bool) {
        let mut unreachable = self.unreachable.write().expect("lock poisoned");
        if reachable {
            unreachable.remove(&id);
        } else {
            unreachable.insert(id);
        }
    }

    /// Number of calls delivered so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Sample a latency in `[min, max]` milliseconds.
    fn sample_latency_ms(&self) -> u64 {
        let (min, max) = self.latency_ms;
        if min == max {
            return min;
        }
        self.rng
            .lock()
            .expect("lock poisoned")
            .random_range(min..=max)
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackNetwork {
    async fn call(&self, to: LocalityId, frame: Bytes) -> Result<Bytes, RpcError> {
        let delay_ms = self.sample_latency_ms();
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if self
            .unreachable
            .read()
            .expect("lock poisoned")
            .contains(&to)
        {
            return Err(RpcError::Unreachable(to));
        }
        let server = self
            .servers
            .read()
            .expect("lock poisoned")
            .get(&to)
            .cloned()
            .ok_or(RpcError::Unreachable(to))?;

        self.calls.fetch_add(1, Ordering::Relaxed);
        trace!(%to, bytes = frame.len(), "loopback call");
        server.handle_frame(&frame)
    }

    fn localities(&self) -> Vec<LocalityId> {
        let mut ids: Vec<LocalityId> = self
            .servers
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}
