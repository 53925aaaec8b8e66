//! Protocol messages for the atoll invocation layer.
//!
//! Requests and responses are postcard-encoded into a single frame each.
//! Keys and values travel as opaque postcard bytes produced by
//! [`to_wire`] and decoded by the hosting component with [`from_wire`].

use atoll_types::{LocalityId, ManifestSnapshot, ShardId};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// A request addressed to one locality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Construct `count` components of a registered type on the target.
    BulkCreate {
        /// Registered component type name.
        type_name: String,
        /// How many components to construct.
        count: u32,
        /// Initial bucket count handed to each constructor.
        bucket_count: Option<u64>,
    },

    /// Deep-copy a hosted component into a new one on the same locality.
    Copy {
        /// Source component.
        shard_id: ShardId,
    },

    /// Drop a hosted component.
    Destroy {
        /// Component to drop.
        shard_id: ShardId,
    },

    /// Look up a key, optionally removing it.
    GetValue {
        /// Target component.
        shard_id: ShardId,
        /// Encoded key.
        key: Vec<u8>,
        /// Remove the entry in the same step.
        erase: bool,
    },

    /// Insert or overwrite a key.
    SetValue {
        /// Target component.
        shard_id: ShardId,
        /// Encoded key.
        key: Vec<u8>,
        /// Encoded value.
        value: Vec<u8>,
    },

    /// Remove a key.
    Erase {
        /// Target component.
        shard_id: ShardId,
        /// Encoded key.
        key: Vec<u8>,
    },

    /// Sum of the sizes of the listed components hosted by the target.
    Size {
        /// Components to count.
        shard_ids: Vec<ShardId>,
    },

    /// Bind a symbolic name to a manifest snapshot.
    RegisterName {
        /// Symbolic name.
        name: String,
        /// Manifest to publish.
        snapshot: ManifestSnapshot,
    },

    /// Resolve a symbolic name.
    ResolveName {
        /// Symbolic name.
        name: String,
    },

    /// Remove a name binding. Unknown names are not an error.
    UnregisterName {
        /// Symbolic name.
        name: String,
    },
}

impl Request {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BulkCreate { .. } => "bulk_create",
            Self::Copy { .. } => "copy",
            Self::Destroy { .. } => "destroy",
            Self::GetValue { .. } => "get_value",
            Self::SetValue { .. } => "set_value",
            Self::Erase { .. } => "erase",
            Self::Size { .. } => "size",
            Self::RegisterName { .. } => "register_name",
            Self::ResolveName { .. } => "resolve_name",
            Self::UnregisterName { .. } => "unregister_name",
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Ids of freshly constructed components, in creation order.
    Created {
        /// New component ids.
        shard_ids: Vec<ShardId>,
    },

    /// Id of the copy produced by [`Request::Copy`].
    Copied {
        /// New component id.
        shard_id: ShardId,
    },

    /// Result of [`Request::GetValue`].
    Value {
        /// Encoded value, `None` when the key is absent.
        value: Option<Vec<u8>>,
    },

    /// Result of [`Request::Erase`] or [`Request::Size`].
    Count {
        /// Number of entries.
        count: u64,
    },

    /// Result of [`Request::ResolveName`].
    Snapshot {
        /// The bound manifest.
        snapshot: ManifestSnapshot,
    },

    /// Success with no payload.
    Done,

    /// The request failed on the target.
    Failed(WireError),
}

impl Response {
    /// Short label used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Copied { .. } => "copied",
            Self::Value { .. } => "value",
            Self::Count { .. } => "count",
            Self::Snapshot { .. } => "snapshot",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Error carried back over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    /// No component with this id on the target.
    ShardNotFound(ShardId),
    /// Component exists but has another type.
    TypeMismatch(ShardId),
    /// No constructor registered under this name.
    UnknownComponentType(String),
    /// Name not bound.
    NameNotFound(String),
    /// Name already bound.
    AlreadyRegistered(String),
    /// Target does not host the name service.
    NotRoot(LocalityId),
    /// The partition refused a new key.
    CapacityExceeded {
        /// Configured entry limit.
        limit: u64,
    },
    /// Anything else, reported as text.
    Serialization(String),
}

/// Encode a value into its wire bytes.
pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RpcError> {
    postcard::to_allocvec(value).map_err(|e| RpcError::Serialization(e.to_string()))
}

/// Decode a value from its wire bytes.
pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    postcard::from_bytes(bytes).map_err(|e| RpcError::Serialization(e.to_string()))
}

/// Encode a message into a frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Bytes, RpcError> {
    to_wire(msg).map(Bytes::from)
}

/// Decode a message from a frame.
pub fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T, RpcError> {
    from_wire(frame)
}
