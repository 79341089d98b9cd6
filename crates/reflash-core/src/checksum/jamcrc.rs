//! Trailing JAMCRC engine (transmission family ASW/CAL)
//!
//! The last four bytes of the block hold, little-endian,
//! `0xFFFF_FFFF - CRC32(block[..len - 4])` with the standard reflected
//! CRC-32.

use crc::{Crc, CRC_32_ISO_HDLC};

use super::{Located, StoredWord};

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(super) fn locate(data: &[u8]) -> Located {
    if data.len() <= 4 {
        return Located::Failed;
    }
    let offset = data.len() - 4;
    let stored = u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]);
    let computed = 0xFFFF_FFFF - CRC.checksum(&data[..offset]);
    Located::Found {
        stored,
        computed,
        word: StoredWord::U32Le(offset),
    }
}
