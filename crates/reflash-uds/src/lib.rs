//! reflash-uds - UDS reflashing stack
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Flasher                           │
//! │  per-block state machine: erase -> download -> transfer │
//! │  -> exit -> checksum, plus the patch sub-flow           │
//! │                          │                              │
//! │                    ┌─────┴─────┐                        │
//! │                    │ UdsClient │                        │
//! │                    │ (services,│                        │
//! │                    │  timing)  │                        │
//! │                    └─────┬─────┘                        │
//! │                          │                              │
//! │                 ┌────────┴────────┐                     │
//! │                 │    Transport    │                     │
//! │                 │ (SocketCAN/mock)│                     │
//! │                 └─────────────────┘                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The orchestrator is written purely against the [`Transport`]
//! capability set; backends own fragmentation, flow control and
//! padding.

pub mod config;
pub mod flash;
pub mod transport;
pub mod uds;

pub use config::{IsoTpSettings, MockConfig, SocketCanConfig, TransportConfig};
pub use flash::{Flasher, FlashError, FlashOptions, FlashProgress, FlashStep, LogProgress};
pub use transport::{create_transport, Transport, TransportError, BROADCAST_RX_ID, BROADCAST_TX_ID};
pub use uds::did::{read_identification, DidCodec, DidEntry, EcuIdent, IDENTIFICATION_DIDS};
pub use uds::{NegativeResponseCode, UdsClient, UdsError};
