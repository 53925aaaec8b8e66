//! Partition storage contract and the in-memory engine.
//!
//! This crate defines the [`PartitionStore`] trait through which a
//! distributed map talks to one shard's local storage, along with
//! [`MemoryPartition`], a `RwLock<HashMap>`-backed implementation hosted by
//! every locality.

mod error;
mod memory_partition;
mod traits;

pub use error::StoreError;
pub use memory_partition::MemoryPartition;
pub use traits::PartitionStore;
