//! Remote invocation for atoll.
//!
//! This crate is the substrate a distributed map runs on:
//!
//! - [`Request`] / [`Response`]: the postcard-encoded protocol.
//! - [`LocalityServer`]: hosts components and, on the root locality, the
//!   name service.
//! - [`ComponentRegistry`]: the explicit table of constructible component
//!   types, shared by every locality.
//! - [`Locality`]: the per-process client: discovery, creation, copy,
//!   destruction, element access and naming.
//! - [`LoopbackNetwork`]: an in-process [`Transport`] with latency and
//!   failure injection.

mod component;
mod error;
mod locality;
mod loopback;
mod message;
mod server;
#[cfg(test)]
mod tests;

pub use component::{ComponentRegistry, Constructor, ShardComponent, partition_type_name};
pub use error::RpcError;
pub use locality::Locality;
pub use loopback::LoopbackNetwork;
pub use message::{Request, Response, WireError, decode_frame, encode_frame, from_wire, to_wire};
pub use server::LocalityServer;

/// Trait abstracting delivery of encoded requests between localities.
///
/// Allows substituting the in-process [`LoopbackNetwork`] for a real network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request frame to `to` and return its response frame.
    async fn call(
        &self,
        to: atoll_types::LocalityId,
        frame: bytes::Bytes,
    ) -> Result<bytes::Bytes, RpcError>;

    /// Every locality this transport can reach, sorted.
    fn localities(&self) -> Vec<atoll_types::LocalityId>;
}
