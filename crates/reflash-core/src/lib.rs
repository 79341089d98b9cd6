//! reflash-core - controller-family model for ECU reflashing
//!
//! This crate holds everything the flashing layers agree on:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      FlashInfo                           │
//! │  One descriptor per controller family: addresses, block  │
//! │  layout, cipher, seed/key script, checksum strategy      │
//! │                                                          │
//! │  ┌──────────┐   ┌──────────┐   ┌────────────────────┐    │
//! │  │ binfile  │   │ checksum │   │ prepare            │    │
//! │  │ (layout) │   │ (verify/ │   │ (fix → compress →  │    │
//! │  │          │   │  repair) │   │  encrypt)          │    │
//! │  └──────────┘   └──────────┘   └────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`Block`] is a named, numbered firmware segment; [`prepare`] turns
//! it into the [`PreparedBlock`] the UDS orchestrator streams to the
//! controller. The [`workshop`] module encodes the traceability record
//! written to the controller on every flash.

pub mod binfile;
pub mod block;
pub mod checksum;
pub mod family;
pub mod prepare;
pub mod workshop;

pub use binfile::BinfileError;
pub use block::{Block, PreparedBlock};
pub use checksum::{ChecksumKind, ChecksumState};
pub use family::{FamilyError, FlashFamily, FlashInfo, PatchInfo};
pub use prepare::{prepare_block, PrepareError};
pub use workshop::{WorkshopCode, WorkshopDecode};
