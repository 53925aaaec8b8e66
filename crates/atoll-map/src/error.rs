//! Error types for the distributed map.

/// Errors that can occur during map operations.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Remote invocation failed.
    #[error("rpc error: {0}")]
    Rpc(#[from] atoll_rpc::RpcError),

    /// A co-located partition rejected the operation.
    #[error("store error: {0}")]
    Store(#[from] atoll_store::StoreError),

    /// The symbolic name has no binding.
    #[error("no map registered under {name:?}")]
    NameNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A co-located partition was destroyed while the map still referenced it.
    #[error("partition {part} is no longer hosted locally")]
    PartitionGone {
        /// Partition number.
        part: usize,
    },

    /// The policy asks for more partitions per locality than one bulk
    /// creation request can carry.
    #[error("{per_locality} partitions per locality exceeds the creation limit")]
    TooManyPartitions {
        /// Partitions that would have been requested from each locality.
        per_locality: usize,
    },

    /// A blocking wrapper was called on a current-thread runtime, where
    /// waiting would deadlock.
    #[error("blocking map operation called from a current-thread runtime")]
    BlockingInAsyncContext,

    /// The map was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A spawned request task panicked or was cancelled.
    #[error("task join error: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for MapError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
