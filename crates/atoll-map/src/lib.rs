//! Distributed, partitioned unordered map.
//!
//! An [`UnorderedMap`] looks like one hash map but keeps its entries in
//! partitions hosted by many localities:
//!
//! - [`Manifest`]: the ordered partitions, each tagged with its host and,
//!   when co-located, a direct pointer to its storage.
//! - [`Router`]: `hash(key) mod partitions`.
//! - [`MapFuture`]: the result of an operation, already complete on the
//!   local fast path and running on the runtime otherwise.
//! - [`ValueProxy`]: deferred read/write of one element.
//!
//! Maps are created from a [`DistributionPolicy`](atoll_types::DistributionPolicy),
//! published with [`UnorderedMap::register_as`] and attached to from other
//! localities with [`UnorderedMap::connect_to`].

use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod error;
pub mod future;
pub mod manifest;
pub mod map;
pub mod proxy;
pub mod router;

pub use error::MapError;
pub use future::MapFuture;
pub use manifest::{Manifest, PartitionHandle};
pub use map::UnorderedMap;
pub use proxy::ValueProxy;
pub use router::Router;

/// Requirements on map keys.
pub trait Key: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> Key for T where T: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static {}

/// Requirements on map values.
pub trait Value: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Value for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

#[cfg(test)]
mod tests;
