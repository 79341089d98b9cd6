//! 16-bit additive engine (haldex family)
//!
//! The stored word sits eight bytes past the family checksum offset.
//! Every little-endian 16-bit word of the block except the stored field
//! is summed modulo 2^16; the stored value is the ones' complement of
//! that sum. The driver block is never checksummed (the family leaves it
//! out of `checksummed_blocks`).

use super::{Located, StoredWord};
use crate::family::FlashInfo;

pub(super) fn locate(info: &FlashInfo, number: u16, data: &[u8]) -> Located {
    let Some(&descriptor) = info.checksum_offsets.get(&number) else {
        return Located::Failed;
    };
    let offset = descriptor + 8;
    if data.len() < offset + 2 || data.len() % 2 != 0 || offset % 2 != 0 {
        return Located::Failed;
    }

    let stored = u16::from_le_bytes([data[offset], data[offset + 1]]);

    let mut sum: u16 = 0;
    for word_offset in (0..data.len()).step_by(2) {
        if word_offset == offset {
            continue;
        }
        let word = u16::from_le_bytes([data[word_offset], data[word_offset + 1]]);
        sum = sum.wrapping_add(word);
    }

    Located::Found {
        stored: stored as u32,
        computed: (0xFFFF - sum) as u32,
        word: StoredWord::U16Le(offset),
    }
}
