//! Error types for partition storage operations.

/// Errors that can occur inside a partition's storage engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The partition already holds its configured maximum number of entries.
    #[error("partition capacity exceeded: limit is {limit} entries")]
    CapacityExceeded {
        /// Maximum number of entries the partition accepts.
        limit: usize,
    },
}
