//! Workshop-code fingerprint
//!
//! A nine-byte traceability record written to the controller on every
//! flash: a BCD-packed date, a CRC-8 of the application software blocks,
//! the calibration identifier, and a trailing CRC-8 sealing the record.
//!
//! ```text
//! +0  BCD year - 2000
//! +1  BCD month
//! +2  BCD day
//! +3  CRC-8 over the concatenated ASW block bytes
//! +4  4-byte calibration identifier
//! +8  CRC-8 over bytes 0..8
//! ```

use crc::{Crc, CRC_8_SMBUS};
use serde::{Deserialize, Serialize};

pub const WORKSHOP_CODE_LEN: usize = 9;

/// Poly 0x07, init 0, unreflected, no final XOR.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Byte pattern at offsets 3-4 that marks codes written by older
/// tooling. The heuristic can false-positive on arbitrary codes.
const OLDER_FORMAT_MAGIC: [u8; 2] = [0x42, 0x04];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopCode {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// CRC-8 over the concatenated ASW block bytes.
    pub asw_checksum: u8,
    pub cal_id: [u8; 4],
}

/// Outcome of decoding a stored workshop code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkshopDecode {
    Valid(WorkshopCode),
    /// Written by older tooling; carries no decodable fields.
    OlderFormat,
    Invalid,
}

impl WorkshopCode {
    pub fn new(year: u16, month: u8, day: u8, asw_checksum: u8, cal_id: [u8; 4]) -> Self {
        Self {
            year,
            month,
            day,
            asw_checksum,
            cal_id,
        }
    }

    /// CRC-8 over the concatenated application software blocks.
    pub fn asw_checksum_of(asw_blocks: &[&[u8]]) -> u8 {
        let mut digest = CRC8.digest();
        for block in asw_blocks {
            digest.update(block);
        }
        digest.finalize()
    }

    pub fn encode(&self) -> [u8; WORKSHOP_CODE_LEN] {
        let mut out = [0u8; WORKSHOP_CODE_LEN];
        out[0] = bcd((self.year.saturating_sub(2000) % 100) as u8);
        out[1] = bcd(self.month);
        out[2] = bcd(self.day);
        out[3] = self.asw_checksum;
        out[4..8].copy_from_slice(&self.cal_id);
        out[8] = CRC8.checksum(&out[..8]);
        out
    }

    pub fn decode(raw: &[u8]) -> WorkshopDecode {
        if raw.len() < WORKSHOP_CODE_LEN {
            return WorkshopDecode::Invalid;
        }
        if raw[3..5] == OLDER_FORMAT_MAGIC {
            return WorkshopDecode::OlderFormat;
        }
        if CRC8.checksum(&raw[..8]) != raw[8] {
            return WorkshopDecode::Invalid;
        }
        let (Some(year), Some(month), Some(day)) = (unbcd(raw[0]), unbcd(raw[1]), unbcd(raw[2]))
        else {
            return WorkshopDecode::Invalid;
        };
        WorkshopDecode::Valid(WorkshopCode {
            year: 2000 + year as u16,
            month,
            day,
            asw_checksum: raw[3],
            cal_id: [raw[4], raw[5], raw[6], raw[7]],
        })
    }
}

fn bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn unbcd(byte: u8) -> Option<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    (high < 10 && low < 10).then_some(high * 10 + low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let code = WorkshopCode::new(2024, 11, 30, 0x5C, [0x12, 0x34, 0x56, 0x78]);
        let raw = code.encode();
        assert_eq!(raw[0], 0x24);
        assert_eq!(raw[1], 0x11);
        assert_eq!(raw[2], 0x30);
        assert_eq!(WorkshopCode::decode(&raw), WorkshopDecode::Valid(code));
    }

    #[test]
    fn any_single_bit_flip_invalidates() {
        let code = WorkshopCode::new(2023, 6, 1, 0xA7, [0xDE, 0xAD, 0xBE, 0xEF]);
        let raw = code.encode();
        for byte in 0..WORKSHOP_CODE_LEN {
            for bit in 0..8 {
                let mut flipped = raw;
                flipped[byte] ^= 1 << bit;
                assert_ne!(
                    WorkshopCode::decode(&flipped),
                    WorkshopDecode::Valid(code.clone()),
                    "flip at byte {byte} bit {bit} survived"
                );
            }
        }
    }

    #[test]
    fn older_format_magic_is_recognized() {
        let mut raw = WorkshopCode::new(2022, 1, 2, 0, [0; 4]).encode();
        raw[3] = 0x42;
        raw[4] = 0x04;
        assert_eq!(WorkshopCode::decode(&raw), WorkshopDecode::OlderFormat);
    }

    #[test]
    fn short_input_is_invalid() {
        assert_eq!(WorkshopCode::decode(&[0u8; 8]), WorkshopDecode::Invalid);
    }

    #[test]
    fn asw_checksum_spans_all_blocks() {
        let a = [1u8, 2, 3];
        let b = [4u8, 5, 6];
        let joined = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(
            WorkshopCode::asw_checksum_of(&[&a, &b]),
            CRC8.checksum(&joined)
        );
    }
}
