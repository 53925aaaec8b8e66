//! The deferred result returned by every asynchronous map operation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::MapError;

/// Result of a map operation that may still be in flight.
///
/// The local fast path produces [`MapFuture::Ready`], already complete. The
/// remote path produces [`MapFuture::Spawned`]: the request is running on
/// the runtime before the caller first polls.
#[must_use = "remote requests are only observed by awaiting the future"]
pub enum MapFuture<T> {
    /// Result computed in-process.
    Ready(Option<Result<T, MapError>>),
    /// Request running on the runtime.
    Spawned(JoinHandle<Result<T, MapError>>),
}

impl<T> MapFuture<T> {
    /// An already completed future.
    pub fn ready(result: Result<T, MapError>) -> Self {
        Self::Ready(Some(result))
    }

    /// Whether the result is available without waiting.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Ready(_) => true,
            Self::Spawned(handle) => handle.is_finished(),
        }
    }
}

// Never pin-projects into `Ready`.
impl<T> Unpin for MapFuture<T> {}

impl<T> Future for MapFuture<T> {
    type Output = Result<T, MapError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            Self::Ready(slot) => Poll::Ready(slot.take().expect("MapFuture polled after completion")),
            Self::Spawned(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.map_err(MapError::from).and_then(|r| r)),
        }
    }
}

impl<T> std::fmt::Debug for MapFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("MapFuture::Ready"),
            Self::Spawned(_) => f.write_str("MapFuture::Spawned"),
        }
    }
}
