//! Error types for remote invocation.

use atoll_store::StoreError;
use atoll_types::{LocalityId, ShardId};

use crate::message::WireError;

/// Errors that can occur while invoking a component or the name service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The target locality does not exist or cannot be reached.
    #[error("locality {0} unreachable")]
    Unreachable(LocalityId),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The hosting locality has no component with this id.
    #[error("shard not found: {0}")]
    ShardNotFound(ShardId),

    /// The component exists but is not of the requested type.
    #[error("shard {0} has a different component type")]
    TypeMismatch(ShardId),

    /// A fast-access pointer was requested for a shard hosted elsewhere.
    #[error("shard {shard} is hosted on {host}, not on {here}")]
    NotLocal {
        /// The shard that was requested.
        shard: ShardId,
        /// The locality hosting it.
        host: LocalityId,
        /// The requesting locality.
        here: LocalityId,
    },

    /// No constructor is registered under this component type name.
    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    /// The symbolic name has no binding in the name service.
    #[error("name not registered: {0}")]
    NameNotFound(String),

    /// The symbolic name is already bound.
    #[error("name already registered: {0}")]
    AlreadyRegistered(String),

    /// A name-service request reached a locality that does not host it.
    #[error("locality {0} does not host the name service")]
    NotRoot(LocalityId),

    /// The shard's storage engine rejected the operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The peer answered with a response of the wrong kind.
    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        /// Response kind the request calls for.
        expected: &'static str,
        /// Response kind actually received.
        got: &'static str,
    },
}

impl From<WireError> for RpcError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ShardNotFound(id) => Self::ShardNotFound(id),
            WireError::TypeMismatch(id) => Self::TypeMismatch(id),
            WireError::UnknownComponentType(name) => Self::UnknownComponentType(name),
            WireError::NameNotFound(name) => Self::NameNotFound(name),
            WireError::AlreadyRegistered(name) => Self::AlreadyRegistered(name),
            WireError::NotRoot(id) => Self::NotRoot(id),
            WireError::CapacityExceeded { limit } => Self::Store(StoreError::CapacityExceeded {
                limit: limit as usize,
            }),
            WireError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

impl From<&RpcError> for WireError {
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::ShardNotFound(id) => Self::ShardNotFound(*id),
            RpcError::TypeMismatch(id) => Self::TypeMismatch(*id),
            RpcError::UnknownComponentType(name) => Self::UnknownComponentType(name.clone()),
            RpcError::NameNotFound(name) => Self::NameNotFound(name.clone()),
            RpcError::AlreadyRegistered(name) => Self::AlreadyRegistered(name.clone()),
            RpcError::NotRoot(id) => Self::NotRoot(*id),
            RpcError::Store(StoreError::CapacityExceeded { limit }) => Self::CapacityExceeded {
                limit: *limit as u64,
            },
            other => Self::Serialization(other.to_string()),
        }
    }
}
