//! Bounded-slice big-endian CRC-32 engine (dq381 family)
//!
//! The block header carries big-endian absolute addresses at fixed
//! offsets: the checksummed range starts at 0x38, ends (inclusive) at
//! 0x3C, and the stored CRC sits at 0x44. The CRC itself is the
//! standard reflected CRC-32.

use crc::{Crc, CRC_32_ISO_HDLC};

use super::{Located, StoredWord};
use crate::family::FlashInfo;

const START_OFFSET: usize = 0x38;
const END_OFFSET: usize = 0x3C;
const STORED_OFFSET: usize = 0x44;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(super) fn locate(info: &FlashInfo, number: u16, data: &[u8]) -> Located {
    let Some(&base) = info.base_addresses.get(&number) else {
        return Located::Failed;
    };
    if data.len() < STORED_OFFSET + 4 {
        return Located::Failed;
    }

    let start = read_be_u32(data, START_OFFSET);
    let end = read_be_u32(data, END_OFFSET);
    let stored = read_be_u32(data, STORED_OFFSET);

    let (Some(local_start), Some(local_end)) = (start.checked_sub(base), end.checked_sub(base))
    else {
        return Located::Failed;
    };
    let (local_start, local_end) = (local_start as usize, local_end as usize);
    if local_end < local_start || local_end >= data.len() {
        return Located::Failed;
    }

    Located::Found {
        stored,
        computed: CRC.checksum(&data[local_start..=local_end]),
        word: StoredWord::U32Be(STORED_OFFSET),
    }
}

fn read_be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
