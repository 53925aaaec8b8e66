//! The per-process handle on the cluster.

use std::any::Any;
use std::sync::Arc;

use atoll_types::{LocalityId, ManifestSnapshot, ShardId};
use tracing::trace;

use crate::Transport;
use crate::error::RpcError;
use crate::message::{Request, Response, decode_frame, encode_frame};
use crate::server::LocalityServer;

/// One process attached to the cluster.
///
/// Requests addressed to this locality are dispatched in place; everything
/// else goes through the [`Transport`].
pub struct Locality {
    server: Arc<LocalityServer>,
    transport: Arc<dyn Transport>,
}

macro_rules! expect_response {
    ($response:expr, $pattern:pat => $out:expr, $expected:literal) => {
        match $response {
            $pattern => Ok($out),
            other => Err(RpcError::UnexpectedResponse {
                expected: $expected,
                got: other.kind(),
            }),
        }
    };
}

impl Locality {
    /// Bind a server to the transport that reaches its peers.
    pub fn new(server: Arc<LocalityServer>, transport: Arc<dyn Transport>) -> Self {
        Self { server, transport }
    }

    /// This process's locality id.
    pub fn find_here(&self) -> LocalityId {
        self.server.id()
    }

    /// Every locality reachable through the transport, sorted.
    pub fn find_all_localities(&self) -> Vec<LocalityId> {
        self.transport.localities()
    }

    /// The locality hosting the name service.
    pub fn name_service(&self) -> LocalityId {
        LocalityId::ROOT
    }

    /// The server hosting this locality's components.
    pub fn server(&self) -> &Arc<LocalityServer> {
        &self.server
    }

    /// Send `request` to `to` and return its successful response.
    pub async fn invoke(&self, to: LocalityId, request: Request) -> Result<Response, RpcError> {
        trace!(from = %self.find_here(), %to, request = request.kind(), "invoke");
        let response = if to == self.find_here() {
            self.server.handle(request)
        } else {
            let frame = encode_frame(&request)?;
            let reply = self.transport.call(to, frame).await?;
            decode_frame(&reply)?
        };
        match response {
            Response::Failed(err) => Err(err.into()),
            ok => Ok(ok),
        }
    }

    /// Construct `count` components of `type_name` on `on`.
    pub async fn bulk_create(
        &self,
        on: LocalityId,
        type_name: &str,
        count: u32,
        bucket_count: Option<usize>,
    ) -> Result<Vec<ShardId>, RpcError> {
        let request = Request::BulkCreate {
            type_name: type_name.to_string(),
            count,
            bucket_count: bucket_count.map(|n| n as u64),
        };
        expect_response!(
            self.invoke(on, request).await?,
            Response::Created { shard_ids } => shard_ids,
            "created"
        )
    }

    /// Deep-copy a component; the copy lives on the same locality.
    pub async fn copy_component(
        &self,
        on: LocalityId,
        shard_id: ShardId,
    ) -> Result<ShardId, RpcError> {
        expect_response!(
            self.invoke(on, Request::Copy { shard_id }).await?,
            Response::Copied { shard_id } => shard_id,
            "copied"
        )
    }

    /// Drop a component.
    pub async fn destroy_component(
        &self,
        on: LocalityId,
        shard_id: ShardId,
    ) -> Result<(), RpcError> {
        expect_response!(
            self.invoke(on, Request::Destroy { shard_id }).await?,
            Response::Done => (),
            "done"
        )
    }

    /// Direct pointer to a component hosted on this locality.
    pub fn resolve_local<T>(&self, shard_id: ShardId) -> Result<Arc<T>, RpcError>
    where
        T: Any + Send + Sync,
    {
        let component = self
            .server
            .component(&shard_id)
            .ok_or(RpcError::ShardNotFound(shard_id))?;
        component
            .into_any()
            .downcast::<T>()
            .map_err(|_| RpcError::TypeMismatch(shard_id))
    }

    /// Look up an encoded key on a component.
    pub async fn get_value(
        &self,
        on: LocalityId,
        shard_id: ShardId,
        key: Vec<u8>,
        erase: bool,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let request = Request::GetValue {
            shard_id,
            key,
            erase,
        };
        expect_response!(
            self.invoke(on, request).await?,
            Response::Value { value } => value,
            "value"
        )
    }

    /// Store an encoded key/value on a component.
    pub async fn set_value(
        &self,
        on: LocalityId,
        shard_id: ShardId,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<(), RpcError> {
        let request = Request::SetValue {
            shard_id,
            key,
            value,
        };
        expect_response!(
            self.invoke(on, request).await?,
            Response::Done => (),
            "done"
        )
    }

    /// Remove an encoded key from a component.
    pub async fn erase(
        &self,
        on: LocalityId,
        shard_id: ShardId,
        key: Vec<u8>,
    ) -> Result<u64, RpcError> {
        expect_response!(
            self.invoke(on, Request::Erase { shard_id, key }).await?,
            Response::Count { count } => count,
            "count"
        )
    }

    /// Sum of the sizes of `shard_ids`, all hosted on `on`.
    pub async fn size_of(&self, on: LocalityId, shard_ids: Vec<ShardId>) -> Result<u64, RpcError> {
        expect_response!(
            self.invoke(on, Request::Size { shard_ids }).await?,
            Response::Count { count } => count,
            "count"
        )
    }

    /// Bind `name` to `snapshot` in the name service.
    pub async fn register_name(
        &self,
        name: &str,
        snapshot: ManifestSnapshot,
    ) -> Result<(), RpcError> {
        let request = Request::RegisterName {
            name: name.to_string(),
            snapshot,
        };
        expect_response!(
            self.invoke(self.name_service(), request).await?,
            Response::Done => (),
            "done"
        )
    }

    /// Look up the manifest bound to `name`.
    pub async fn resolve_name(&self, name: &str) -> Result<ManifestSnapshot, RpcError> {
        let request = Request::ResolveName {
            name: name.to_string(),
        };
        expect_response!(
            self.invoke(self.name_service(), request).await?,
            Response::Snapshot { snapshot } => snapshot,
            "snapshot"
        )
    }

    /// Remove the binding for `name`. Unknown names succeed.
    pub async fn unregister_name(&self, name: &str) -> Result<(), RpcError> {
        let request = Request::UnregisterName {
            name: name.to_string(),
        };
        expect_response!(
            self.invoke(self.name_service(), request).await?,
            Response::Done => (),
            "done"
        )
    }
}

impl std::fmt::Debug for Locality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locality")
            .field("id", &self.find_here())
            .finish_non_exhaustive()
    }
}
