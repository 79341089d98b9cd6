//! UDS (ISO 14229) protocol layer
//!
//! Service encoders/decoders for the subset of UDS the reflashing flow
//! uses, the negative-response taxonomy, and the DID codec registry.

pub mod client;
pub mod did;
mod error;
mod nrc;

pub use client::UdsClient;
pub use error::UdsError;
pub use nrc::NegativeResponseCode;

/// Standard UDS service ID constants
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFO: u8 = 0x14;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const WRITE_DATA_BY_ID: u8 = 0x2E;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// DiagnosticSessionControl (0x10) sub-functions
pub mod session {
    pub const EXTENDED: u8 = 0x03;
    /// The programming session these controllers expect; not the
    /// ISO-standard 0x02.
    pub const PROGRAMMING: u8 = 0x4F;
}

/// SecurityAccess (0x27) sub-functions for the reflashing access level
pub mod security {
    pub const REQUEST_SEED: u8 = 0x03;
    pub const SEND_KEY: u8 = 0x04;
}

/// RoutineControl (0x31) identifiers
pub mod routine {
    /// Start-routine sub-function.
    pub const START: u8 = 0x01;

    /// Verify a flashed block's checksum.
    pub const CHECKSUM: u16 = 0x0202;
    /// Programming precondition check.
    pub const PRECONDITION: u16 = 0x0203;
    /// Erase a flash region.
    pub const ERASE: u16 = 0xFF00;
    /// Check programming dependencies after all blocks are written.
    pub const CHECK_DEPENDENCIES: u16 = 0xFF01;
}

/// ECUReset (0x11) sub-functions
pub mod reset_type {
    pub const HARD_RESET: u8 = 0x01;
}

/// ClearDiagnosticInformation (0x14) DTC groups
pub mod dtc_group {
    pub const ALL: u32 = 0xFF_FFFF;
}

/// One-byte OBD clear-emissions request sent on the broadcast channel.
pub const OBD_CLEAR_EMISSIONS: u8 = 0x04;

/// Data identifiers used by the reflashing flow
pub mod data_id {
    pub const WORKSHOP_CODE: u16 = 0xF15A;
    pub const ACTIVE_SESSION: u16 = 0xF186;
    pub const SPARE_PART_NUMBER: u16 = 0xF187;
    pub const ECU_SOFTWARE_NUMBER: u16 = 0xF188;
    pub const ECU_SOFTWARE_VERSION: u16 = 0xF189;
    pub const VIN: u16 = 0xF190;
    pub const ECU_HARDWARE_NUMBER: u16 = 0xF191;
    pub const SYSTEM_NAME: u16 = 0xF197;
    pub const PROGRAMMING_DATE: u16 = 0xF199;
}
