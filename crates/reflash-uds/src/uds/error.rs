//! UDS protocol errors

use thiserror::Error;

use super::NegativeResponseCode;
use crate::transport::TransportError;

#[derive(Debug, Error, Clone)]
pub enum UdsError {
    #[error("Negative response: {nrc} (0x{nrc:02X}) for service 0x{service_id:02X}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unexpected response 0x{got:02X} to service 0x{service:02X}")]
    UnexpectedResponse { service: u8, got: u8 },

    #[error("Response timeout")]
    Timeout,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
