//! Flat-image (binfile) layout
//!
//! A flat image is a fixed-size byte vector with one window per block at
//! the family's documented offsets. Splitting an image filters out
//! windows whose embedded software version does not belong to the
//! family's project; assembling zero-fills everything outside the named
//! blocks.

use thiserror::Error;
use tracing::{debug, warn};

use crate::block::Block;
use crate::family::FlashInfo;

#[derive(Debug, Error)]
pub enum BinfileError {
    #[error("Flat image is {got} bytes, family expects {expected}")]
    WrongImageSize { expected: usize, got: usize },

    #[error("Block {number} has no window in this family's flat image")]
    NoWindow { number: u16 },

    #[error("Block {number} is {got} bytes, its window holds {window}")]
    BlockTooLarge {
        number: u16,
        window: usize,
        got: usize,
    },

    #[error("Dynamic length field of block {number} lies outside its window")]
    BadLengthField { number: u16 },
}

/// Split a flat image into the family's blocks.
///
/// Blocks with a software-version range whose content does not start
/// with the family project name are dropped with a warning; blocks
/// without a version range are kept unconditionally.
pub fn blocks_from_bin(info: &FlashInfo, data: &[u8]) -> Result<Vec<Block>, BinfileError> {
    if data.len() != info.binfile_size {
        return Err(BinfileError::WrongImageSize {
            expected: info.binfile_size,
            got: data.len(),
        });
    }

    let mut blocks = Vec::new();
    for (&number, &offset) in &info.binfile_layout {
        let length = window_length(info, number, offset, data)?;
        let slice = &data[offset..offset + length];

        if let Some(range) = info.software_version_offsets.get(&number) {
            let version = slice.get(range.clone()).unwrap_or_default();
            if !version.starts_with(info.project_name.as_bytes()) {
                warn!(
                    block = number,
                    version = %String::from_utf8_lossy(version),
                    project = info.project_name,
                    "dropping block with foreign software version"
                );
                continue;
            }
        }

        debug!(block = number, length, "sliced block from flat image");
        blocks.push(Block::new(number, info.block_name(number), slice.to_vec()));
    }
    Ok(blocks)
}

/// Assemble named blocks into a zero-filled flat image.
pub fn bin_from_blocks(info: &FlashInfo, blocks: &[Block]) -> Result<Vec<u8>, BinfileError> {
    let mut data = vec![0u8; info.binfile_size];
    for block in blocks {
        let &offset =
            info.binfile_layout
                .get(&block.number)
                .ok_or(BinfileError::NoWindow {
                    number: block.number,
                })?;
        let window = info
            .block_lengths
            .get(&block.number)
            .copied()
            .unwrap_or_default();
        if block.data.len() > window {
            return Err(BinfileError::BlockTooLarge {
                number: block.number,
                window,
                got: block.data.len(),
            });
        }
        data[offset..offset + block.data.len()].copy_from_slice(&block.data);
    }
    Ok(data)
}

/// Window length for a block, honoring dynamic length fields where the
/// family defines them (the haldex image records each section's true
/// length in its header).
fn window_length(
    info: &FlashInfo,
    number: u16,
    offset: usize,
    data: &[u8],
) -> Result<usize, BinfileError> {
    let fixed = info
        .block_lengths
        .get(&number)
        .copied()
        .ok_or(BinfileError::NoWindow { number })?;

    let Some(&field) = info.dynamic_length_offsets.get(&number) else {
        return Ok(fixed);
    };
    if field + 4 > fixed {
        return Err(BinfileError::BadLengthField { number });
    }
    let at = offset + field;
    let dynamic = u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize;
    if dynamic == 0 || dynamic > fixed {
        return Err(BinfileError::BadLengthField { number });
    }
    Ok(dynamic)
}
