//! Request dispatch on one locality.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use atoll_types::{LocalityId, ManifestSnapshot, ShardId};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::component::{ComponentRegistry, ShardComponent};
use crate::error::RpcError;
use crate::message::{Request, Response, WireError, decode_frame, encode_frame};

/// Symbolic name to manifest bindings, hosted by the root locality.
#[derive(Debug, Default)]
struct NameTable {
    bindings: RwLock<HashMap<String, ManifestSnapshot>>,
}

impl NameTable {
    fn register(&self, name: String, snapshot: ManifestSnapshot) -> Result<(), RpcError> {
        let mut bindings = self.bindings.write().expect("lock poisoned");
        if bindings.contains_key(&name) {
            return Err(RpcError::AlreadyRegistered(name));
        }
        debug!(%name, partitions = snapshot.len(), "registered name");
        bindings.insert(name, snapshot);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<ManifestSnapshot, RpcError> {
        let bindings = self.bindings.read().expect("lock poisoned");
        bindings
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::NameNotFound(name.to_string()))
    }

    fn unregister(&self, name: &str) -> bool {
        let removed = self
            .bindings
            .write()
            .expect("lock poisoned")
            .remove(name)
            .is_some();
        if removed {
            debug!(%name, "unregistered name");
        }
        removed
    }
}

/// Hosts the components of one locality and answers requests for them.
///
/// The root locality additionally hosts the name service.
pub struct LocalityServer {
    id: LocalityId,
    registry: Arc<ComponentRegistry>,
    components: RwLock<HashMap<ShardId, Arc<dyn ShardComponent>>>,
    next_seq: AtomicU64,
    names: Option<NameTable>,
}

impl LocalityServer {
    /// Create the server for locality `id`.
    pub fn new(id: LocalityId, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            id,
            registry,
            components: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            names: (id == LocalityId::ROOT).then(NameTable::default),
        }
    }

    /// The locality this server runs on.
    pub fn id(&self) -> LocalityId {
        self.id
    }

    /// Whether this server hosts the name service.
    pub fn hosts_names(&self) -> bool {
        self.names.is_some()
    }

    /// The component registered under `shard_id`, if hosted here.
    pub fn component(&self, shard_id: &ShardId) -> Option<Arc<dyn ShardComponent>> {
        self.components
            .read()
            .expect("lock poisoned")
            .get(shard_id)
            .cloned()
    }

    /// Number of hosted components.
    pub fn component_count(&self) -> usize {
        self.components.read().expect("lock poisoned").len()
    }

    /// Decode a frame, dispatch it and encode the answer.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<Bytes, RpcError> {
        let request: Request = decode_frame(frame)?;
        encode_frame(&self.handle(request))
    }

    /// Dispatch one request. Failures are folded into [`Response::Failed`].
    pub fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                debug!(locality = %self.id, request = kind, error = %e, "request failed");
                Response::Failed(WireError::from(&e))
            }
        }
    }

    /// Remove a name binding directly. Only valid on the root locality.
    pub fn unregister_name(&self, name: &str) -> Result<bool, RpcError> {
        Ok(self.name_table()?.unregister(name))
    }

    fn dispatch(&self, request: Request) -> Result<Response, RpcError> {
        match request {
            Request::BulkCreate {
                type_name,
                count,
                bucket_count,
            } => {
                let bucket_count = bucket_count.unwrap_or(0) as usize;
                let mut built = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    built.push(self.registry.construct(&type_name, bucket_count)?);
                }
                let shard_ids = built.into_iter().map(|c| self.install(c)).collect();
                debug!(locality = %self.id, %type_name, count, "created components");
                Ok(Response::Created { shard_ids })
            }
            Request::Copy { shard_id } => {
                let source = self.require(&shard_id)?;
                let shard_id = self.install(source.duplicate_component());
                Ok(Response::Copied { shard_id })
            }
            Request::Destroy { shard_id } => {
                let removed = self
                    .components
                    .write()
                    .expect("lock poisoned")
                    .remove(&shard_id);
                if removed.is_none() {
                    warn!(locality = %self.id, %shard_id, "destroy of unknown shard");
                }
                Ok(Response::Done)
            }
            Request::GetValue {
                shard_id,
                key,
                erase,
            } => {
                let value = self.require(&shard_id)?.get_raw(&key, erase)?;
                Ok(Response::Value { value })
            }
            Request::SetValue {
                shard_id,
                key,
                value,
            } => {
                self.require(&shard_id)?.set_raw(&key, &value)?;
                Ok(Response::Done)
            }
            Request::Erase { shard_id, key } => {
                let count = self.require(&shard_id)?.erase_raw(&key)?;
                Ok(Response::Count { count })
            }
            Request::Size { shard_ids } => {
                let mut count = 0u64;
                for shard_id in &shard_ids {
                    count += self.require(shard_id)?.entry_count();
                }
                Ok(Response::Count { count })
            }
            Request::RegisterName { name, snapshot } => {
                self.name_table()?.register(name, snapshot)?;
                Ok(Response::Done)
            }
            Request::ResolveName { name } => {
                let snapshot = self.name_table()?.resolve(&name)?;
                Ok(Response::Snapshot { snapshot })
            }
            Request::UnregisterName { name } => {
                self.name_table()?.unregister(&name);
                Ok(Response::Done)
            }
        }
    }

    fn install(&self, component: Arc<dyn ShardComponent>) -> ShardId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let shard_id = ShardId::mint(self.id, seq);
        self.components
            .write()
            .expect("lock poisoned")
            .insert(shard_id, component);
        shard_id
    }

    fn require(&self, shard_id: &ShardId) -> Result<Arc<dyn ShardComponent>, RpcError> {
        self.component(shard_id)
            .ok_or(RpcError::ShardNotFound(*shard_id))
    }

    fn name_table(&self) -> Result<&NameTable, RpcError> {
        self.names.as_ref().ok_or(RpcError::NotRoot(self.id))
    }
}

impl std::fmt::Debug for LocalityServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalityServer")
            .field("id", &self.id)
            .field("components", &self.component_count())
            .field("hosts_names", &self.hosts_names())
            .finish()
    }
}
