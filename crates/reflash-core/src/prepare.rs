//! Block preparation pipeline
//!
//! Turns a plain [`Block`] into the [`PreparedBlock`] the orchestrator
//! streams to the controller: repair the flash checksum, record the
//! checksum word the controller's verify routine expects, compress, pad
//! to the cipher block size and encrypt.

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;
use tracing::{debug, info};

use reflash_crypto::{lzss, BlockCipher, CryptoError, Padding};

use crate::block::{Block, PreparedBlock};
use crate::checksum::ChecksumState;
use crate::family::FlashInfo;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("Checksum metadata of block {number} ({name}) could not be located")]
    ChecksumUnlocatable { number: u16, name: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Prepare one block for flashing.
///
/// `default_box_code` is used when the block does not embed a box code
/// at the family's documented offset.
pub fn prepare_block(
    info: &FlashInfo,
    block: &Block,
    should_erase: bool,
    default_box_code: &str,
) -> Result<PreparedBlock, PrepareError> {
    let (state, data) = info
        .checksum
        .fix(info, block.number, block.data.clone());
    match state {
        ChecksumState::Valid => {}
        ChecksumState::Invalid | ChecksumState::Failed => {
            return Err(PrepareError::ChecksumUnlocatable {
                number: block.number,
                name: block.name.clone(),
            });
        }
    }

    let uds_checksum = CRC32.checksum(&data).to_be_bytes();

    let compressed = if info.compression != 0 {
        let padding = match info.cipher {
            BlockCipher::AesCbc { .. } => Padding::CipherBlock,
            _ => Padding::None,
        };
        let compressed = lzss::compress(&data, padding);
        debug!(
            block = block.number,
            plain = data.len(),
            compressed = compressed.len(),
            "compressed block"
        );
        compressed
    } else {
        data
    };

    let encrypted = info.cipher.encrypt(&compressed)?;
    let box_code = embedded_box_code(info, block).unwrap_or_else(|| default_box_code.to_string());

    info!(
        block = block.number,
        name = %block.name,
        size = encrypted.len(),
        box_code = %box_code,
        "prepared block"
    );

    Ok(PreparedBlock {
        number: block.number,
        name: block.name.clone(),
        box_code,
        compression: info.compression,
        encryption: info.encryption,
        should_erase,
        uds_checksum,
        data: encrypted,
    })
}

/// Prepare a set of blocks in caller order, erasing each target region.
pub fn prepare_blocks(
    info: &FlashInfo,
    blocks: &[Block],
    default_box_code: &str,
) -> Result<Vec<PreparedBlock>, PrepareError> {
    blocks
        .iter()
        .map(|block| prepare_block(info, block, true, default_box_code))
        .collect()
}

/// Box code embedded in the block, when the family documents one and it
/// decodes as printable ASCII.
fn embedded_box_code(info: &FlashInfo, block: &Block) -> Option<String> {
    let range = info.box_code_offsets.get(&block.number)?;
    let raw = block.data.get(range.clone())?;
    let text: String = raw
        .iter()
        .map(|&b| b as char)
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();
    let trimmed = text.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}
