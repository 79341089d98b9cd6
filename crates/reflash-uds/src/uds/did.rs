//! DID codec registry
//!
//! Maps data identifiers to the codec used to render their payloads.
//! The registry drives the `get-ecu-info` sweep and the workshop-code
//! write on DID 0xF15A.

use tracing::debug;

use reflash_core::workshop::{WorkshopCode, WorkshopDecode};

use super::{data_id, UdsClient, UdsError};

/// How a DID payload is rendered for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidCodec {
    /// Printable ASCII, trailing NUL/space trimmed.
    Ascii,
    /// Plain hex dump.
    Hex,
    /// The 10-byte workshop-code record (9-byte fingerprint plus a
    /// padding byte).
    WorkshopCode,
}

impl DidCodec {
    pub fn decode(&self, data: &[u8]) -> String {
        match self {
            DidCodec::Ascii => {
                let text: String = data
                    .iter()
                    .map(|&b| if b.is_ascii_graphic() { b as char } else { ' ' })
                    .collect();
                text.trim().to_string()
            }
            DidCodec::Hex => hex::encode_upper(data),
            DidCodec::WorkshopCode => match WorkshopCode::decode(data) {
                WorkshopDecode::Valid(code) => format!(
                    "20{:02}-{:02}-{:02} asw={:02X} cal={}",
                    code.year % 100,
                    code.month,
                    code.day,
                    code.asw_checksum,
                    hex::encode_upper(code.cal_id),
                ),
                WorkshopDecode::OlderFormat => "older-format workshop code".to_string(),
                WorkshopDecode::Invalid => format!("invalid ({})", hex::encode_upper(data)),
            },
        }
    }
}

/// One identification entry: (did, key, label, codec).
#[derive(Debug, Clone, Copy)]
pub struct DidEntry {
    pub did: u16,
    pub key: &'static str,
    pub label: &'static str,
    pub codec: DidCodec,
}

/// Identification DIDs swept by `get-ecu-info`.
pub const IDENTIFICATION_DIDS: &[DidEntry] = &[
    DidEntry {
        did: data_id::VIN,
        key: "vin",
        label: "VIN",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::SPARE_PART_NUMBER,
        key: "box_code",
        label: "Box Code",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::ECU_SOFTWARE_NUMBER,
        key: "sw_number",
        label: "Software Number",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::ECU_SOFTWARE_VERSION,
        key: "sw_version",
        label: "Software Version",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::ECU_HARDWARE_NUMBER,
        key: "hw_number",
        label: "Hardware Number",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::SYSTEM_NAME,
        key: "system_name",
        label: "System Name",
        codec: DidCodec::Ascii,
    },
    DidEntry {
        did: data_id::PROGRAMMING_DATE,
        key: "programming_date",
        label: "Programming Date",
        codec: DidCodec::Hex,
    },
    DidEntry {
        did: data_id::ACTIVE_SESSION,
        key: "active_session",
        label: "Active Session",
        codec: DidCodec::Hex,
    },
    DidEntry {
        did: data_id::WORKSHOP_CODE,
        key: "workshop_code",
        label: "Workshop Code",
        codec: DidCodec::WorkshopCode,
    },
];

/// One decoded identification value.
#[derive(Debug, Clone)]
pub struct EcuIdent {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

/// Sweep the identification registry. DIDs the controller refuses are
/// skipped.
pub async fn read_identification(client: &UdsClient) -> Result<Vec<EcuIdent>, UdsError> {
    let mut idents = Vec::new();
    for entry in IDENTIFICATION_DIDS {
        match client.read_data_by_identifier(entry.did).await {
            Ok(data) => idents.push(EcuIdent {
                key: entry.key,
                label: entry.label,
                value: entry.codec.decode(&data),
            }),
            Err(UdsError::NegativeResponse { nrc, .. }) => {
                debug!(did = format_args!("0x{:04X}", entry.did), %nrc, "DID not readable");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(idents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_codec_trims_padding() {
        assert_eq!(
            DidCodec::Ascii.decode(b"8V0906259H\x00\x00"),
            "8V0906259H"
        );
    }

    #[test]
    fn workshop_codec_renders_valid_codes() {
        let mut raw = WorkshopCode::new(2024, 3, 9, 0x5C, [0x12, 0x34, 0x56, 0x78])
            .encode()
            .to_vec();
        raw.push(0x00);
        let text = DidCodec::WorkshopCode.decode(&raw);
        assert_eq!(text, "2024-03-09 asw=5C cal=12345678");
    }

    #[test]
    fn workshop_codec_flags_older_format() {
        let raw = [0x20, 0x01, 0x01, 0x42, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            DidCodec::WorkshopCode.decode(&raw),
            "older-format workshop code"
        );
    }

    #[test]
    fn registry_covers_the_workshop_code() {
        assert!(IDENTIFICATION_DIDS
            .iter()
            .any(|e| e.did == data_id::WORKSHOP_CODE && e.codec == DidCodec::WorkshopCode));
    }
}
