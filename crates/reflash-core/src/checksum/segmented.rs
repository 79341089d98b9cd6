//! Segmented-range CRC-32 engine (engine family)
//!
//! The block carries a checksum descriptor at a family-specified offset:
//!
//! ```text
//! +0  u32 LE   stored checksum
//! +4  u8       area count
//! +5  area count x { u32 LE start address, u32 LE end address }
//! ```
//!
//! Addresses are absolute; they are rebased against the block's base
//! address before slicing. The CRC is polynomial 0x04C11DB7, initial
//! value 0, MSB-first, no reflection, no final XOR.

use crc::{Algorithm, Crc};

use super::{Located, StoredWord};
use crate::family::FlashInfo;

const AREA_COUNT_MAX: usize = 16;

/// Unreflected zero-init CRC-32 as the flash controller computes it.
const CRC_32_PLAIN: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0x0000_0000,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x89A1_897F,
    residue: 0x0000_0000,
};

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_PLAIN);

pub(super) fn locate(info: &FlashInfo, number: u16, data: &[u8]) -> Located {
    let Some(&offset) = info.checksum_offsets.get(&number) else {
        return Located::Failed;
    };
    let Some(&base) = info.base_addresses.get(&number) else {
        return Located::Failed;
    };
    if data.len() < offset + 5 {
        return Located::Failed;
    }

    let stored = u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]);
    let area_count = data[offset + 4] as usize;
    if area_count == 0 || area_count > AREA_COUNT_MAX {
        return Located::Failed;
    }
    if data.len() < offset + 5 + area_count * 8 {
        return Located::Failed;
    }

    let mut digest = CRC.digest();
    for area in 0..area_count {
        let entry = offset + 5 + area * 8;
        let start = read_le_u32(data, entry);
        let end = read_le_u32(data, entry + 4);

        let (Some(local_start), Some(local_end)) =
            (start.checked_sub(base), end.checked_sub(base))
        else {
            return Located::Failed;
        };
        let (local_start, local_end) = (local_start as usize, local_end as usize);
        if local_end < local_start || local_end >= data.len() {
            return Located::Failed;
        }
        digest.update(&data[local_start..=local_end]);
    }

    Located::Found {
        stored,
        computed: digest.finalize(),
        word: StoredWord::U32Le(offset),
    }
}

fn read_le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
