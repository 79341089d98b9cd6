//! Transport layer for UDS communication
//!
//! Backends implement the [`Transport`] capability set; the orchestrator
//! never sees anything below it. Shipped variants:
//! - SocketCAN ISO-TP (Linux only)
//! - In-memory mock with scripted replies, for tests and dry runs
//!
//! A flash session uses two channels: the primary channel addressed at
//! the control module, and a broadcast channel used to clear emissions
//! codes before and after reprogramming.

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::Transport;
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Receive identifier of the broadcast clear-emissions channel.
pub const BROADCAST_RX_ID: u32 = 0x7E8;
/// Transmit identifier of the broadcast clear-emissions channel.
pub const BROADCAST_TX_ID: u32 = 0x700;

/// Create a transport for the given addressing.
pub fn create_transport(
    config: &TransportConfig,
    rx_id: u32,
    tx_id: u32,
) -> Result<Arc<dyn Transport>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let transport = socketcan::SocketCanTransport::new(cfg, rx_id, tx_id)?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let _ = (rx_id, tx_id);
            Ok(Arc::new(mock::MockTransport::new(cfg)))
        }
    }
}
