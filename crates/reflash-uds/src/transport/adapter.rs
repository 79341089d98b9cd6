//! Transport capability trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Transport-agnostic interface for exchanging whole UDS payloads.
///
/// Fragmentation, flow control and padding are the backend's concern;
/// callers only see complete request and response payloads. Inbound
/// frames are buffered until consumed, so a slow caller never drops a
/// response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying channel. Opening an open transport is a
    /// no-op.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the channel and stop any receiver task.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Send one payload without waiting for a reply.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next inbound payload.
    async fn wait_frame(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Drop any buffered inbound payloads.
    async fn empty_rx(&self);
}
