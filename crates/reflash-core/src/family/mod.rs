//! Controller-family descriptors
//!
//! A [`FlashInfo`] parameterizes every family-specific behavior: block
//! addresses and lengths, transfer chunk sizes, the payload cipher, the
//! seed/key script, the checksum strategy and the flat-image layout.
//! Descriptors are constructed once and never mutated; everything else
//! in the workspace takes `&FlashInfo`.

mod tables;

use std::collections::BTreeMap;
use std::ops::Range;

use reflash_crypto::{BlockCipher, CryptoError};
use thiserror::Error;

use crate::checksum::ChecksumKind;

#[derive(Debug, Error)]
pub enum FamilyError {
    #[error("Unknown controller family '{0}'")]
    UnknownFamily(String),

    #[error("Unknown block '{0}' for this family")]
    UnknownBlock(String),

    #[error("Block {number} has no {field} entry for this family")]
    MissingBlockEntry { number: u16, field: &'static str },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// The controller families this tool can reprogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashFamily {
    /// Engine controllers (AES payloads, segmented CRC-32, patch mode).
    Simos,
    /// DQ250 transmission controllers (substitution cipher, JAMCRC).
    Dsg,
    /// Haldex coupling controllers (counter-XOR, additive checksum).
    Haldex,
    /// DQ381 transmission controllers (AES payloads, bounded CRC-32).
    Dq381,
}

impl FlashFamily {
    pub const ALL: [FlashFamily; 4] = [
        FlashFamily::Simos,
        FlashFamily::Dsg,
        FlashFamily::Haldex,
        FlashFamily::Dq381,
    ];

    pub fn from_name(name: &str) -> Result<Self, FamilyError> {
        match name.to_ascii_lowercase().as_str() {
            "simos" => Ok(FlashFamily::Simos),
            "dsg" | "dq250" => Ok(FlashFamily::Dsg),
            "haldex" => Ok(FlashFamily::Haldex),
            "dq381" => Ok(FlashFamily::Dq381),
            other => Err(FamilyError::UnknownFamily(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlashFamily::Simos => "simos",
            FlashFamily::Dsg => "dsg",
            FlashFamily::Haldex => "haldex",
            FlashFamily::Dq381 => "dq381",
        }
    }

    /// Build the family descriptor.
    pub fn info(&self) -> Result<FlashInfo, FamilyError> {
        match self {
            FlashFamily::Simos => tables::simos(),
            FlashFamily::Dsg => tables::dsg(),
            FlashFamily::Haldex => tables::haldex(),
            FlashFamily::Dq381 => tables::dq381(),
        }
    }
}

impl std::fmt::Display for FlashFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Address-dependent transfer sizing for the patch sub-flow.
///
/// Patch writes go to unerased flash; lines covered by ECC must be
/// written in 8-byte units, everything else accepts full chunks.
#[derive(Debug, Clone)]
pub struct PatchInfo {
    /// A block numbered above this is a patch of `number - block_offset`.
    pub block_offset: u16,
    /// The calibration block erased before any patch is written.
    pub cal_block: u16,
    /// DFI compression nibble used for patch downloads.
    pub compression: u8,
    /// DFI encryption nibble used for patch downloads.
    pub encryption: u8,
    pub default_chunk: usize,
    pub ecc_chunk: usize,
    /// Inclusive absolute address ranges requiring short writes.
    pub ecc_windows: &'static [(u32, u32)],
}

impl PatchInfo {
    /// Chunk size for a TransferData write starting at `address`. A
    /// chunk never crosses into or out of an ECC window.
    pub fn transfer_size(&self, address: u32) -> usize {
        for &(start, end) in self.ecc_windows {
            if (start..=end).contains(&address) {
                return self.ecc_chunk.min((end - address + 1) as usize);
            }
        }
        let mut chunk = self.default_chunk;
        for &(start, _) in self.ecc_windows {
            if address < start {
                chunk = chunk.min((start - address) as usize);
            }
        }
        chunk
    }
}

/// Everything family-specific, in one read-only value.
#[derive(Debug, Clone)]
pub struct FlashInfo {
    pub family: FlashFamily,
    /// Prefix the software version of an accepted block must carry.
    pub project_name: &'static str,

    pub base_addresses: BTreeMap<u16, u32>,
    pub block_lengths: BTreeMap<u16, usize>,
    pub transfer_sizes: BTreeMap<u16, usize>,
    /// Block number -> identifier used on the UDS wire (erase routine,
    /// RequestDownload memory address byte).
    pub block_identifiers: BTreeMap<u16, u8>,
    pub software_version_offsets: BTreeMap<u16, Range<usize>>,
    pub box_code_offsets: BTreeMap<u16, Range<usize>>,

    pub binfile_layout: BTreeMap<u16, usize>,
    pub binfile_size: usize,
    /// Blocks whose window length is re-read from a little-endian u32 at
    /// this offset into the block's slice (haldex).
    pub dynamic_length_offsets: BTreeMap<u16, usize>,

    pub sa2_script: &'static [u8],
    pub cipher: BlockCipher,
    /// DFI compression nibble (0 = uncompressed).
    pub compression: u8,
    /// DFI encryption nibble.
    pub encryption: u8,

    pub checksum: ChecksumKind,
    pub checksum_offsets: BTreeMap<u16, usize>,
    pub checksummed_blocks: &'static [u16],

    pub patch: Option<PatchInfo>,
    pub block_names: BTreeMap<&'static str, u16>,

    /// Control module addressing (tester -> ECU is `tx_id`).
    pub rx_id: u32,
    pub tx_id: u32,
}

impl FlashInfo {
    /// Resolve a block argument that is either a number or a name.
    pub fn block_to_number(&self, arg: &str) -> Result<u16, FamilyError> {
        if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit()) {
            return arg
                .parse()
                .map_err(|_| FamilyError::UnknownBlock(arg.to_string()));
        }
        let upper = arg.to_ascii_uppercase();
        self.block_names
            .get(upper.as_str())
            .copied()
            .ok_or_else(|| FamilyError::UnknownBlock(arg.to_string()))
    }

    /// Canonical name of a block number.
    pub fn block_name(&self, number: u16) -> &'static str {
        self.block_names
            .iter()
            .find(|(_, &n)| n == number)
            .map(|(name, _)| *name)
            .unwrap_or("UNKNOWN")
    }

    pub fn base_address(&self, number: u16) -> Result<u32, FamilyError> {
        self.base_addresses
            .get(&number)
            .copied()
            .ok_or(FamilyError::MissingBlockEntry {
                number,
                field: "base address",
            })
    }

    pub fn block_length(&self, number: u16) -> Result<usize, FamilyError> {
        self.block_lengths
            .get(&number)
            .copied()
            .ok_or(FamilyError::MissingBlockEntry {
                number,
                field: "length",
            })
    }

    pub fn transfer_size(&self, number: u16) -> Result<usize, FamilyError> {
        self.transfer_sizes
            .get(&number)
            .copied()
            .ok_or(FamilyError::MissingBlockEntry {
                number,
                field: "transfer size",
            })
    }

    pub fn block_identifier(&self, number: u16) -> Result<u8, FamilyError> {
        self.block_identifiers
            .get(&number)
            .copied()
            .ok_or(FamilyError::MissingBlockEntry {
                number,
                field: "block identifier",
            })
    }

    /// Blocks flashed by the ordinary per-block flow, in layout order.
    pub fn flashable_blocks(&self) -> Vec<u16> {
        self.binfile_layout.keys().copied().collect()
    }

    /// Layout consistency: every window fits the flat image.
    pub(crate) fn layout_is_consistent(&self) -> bool {
        self.binfile_layout.iter().all(|(number, &offset)| {
            self.block_lengths
                .get(number)
                .is_some_and(|&len| offset + len <= self.binfile_size)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_builds() {
        for family in FlashFamily::ALL {
            let info = family.info().unwrap();
            assert_eq!(info.family, family);
            assert!(info.layout_is_consistent(), "{family} layout broken");
            assert!(!info.sa2_script.is_empty());
        }
    }

    #[test]
    fn per_block_maps_cover_flashable_blocks() {
        for family in FlashFamily::ALL {
            let info = family.info().unwrap();
            for number in info.flashable_blocks() {
                assert!(info.base_address(number).is_ok(), "{family} #{number}");
                assert!(info.block_length(number).is_ok(), "{family} #{number}");
                assert!(info.transfer_size(number).is_ok(), "{family} #{number}");
                assert!(info.block_identifier(number).is_ok(), "{family} #{number}");
            }
        }
    }

    #[test]
    fn block_to_number_accepts_digits_and_names() {
        let info = FlashFamily::Simos.info().unwrap();
        assert_eq!(info.block_to_number("5").unwrap(), 5);
        assert_eq!(info.block_to_number("cal").unwrap(), 5);
        assert_eq!(info.block_to_number("ASW1").unwrap(), 2);
        assert!(matches!(
            info.block_to_number("bogus"),
            Err(FamilyError::UnknownBlock(_))
        ));
    }

    #[test]
    fn family_registry_resolves_aliases() {
        assert_eq!(FlashFamily::from_name("DQ250").unwrap(), FlashFamily::Dsg);
        assert_eq!(FlashFamily::from_name("simos").unwrap(), FlashFamily::Simos);
        assert!(FlashFamily::from_name("edc17").is_err());
    }

    #[test]
    fn patch_transfer_size_respects_ecc_windows() {
        let info = FlashFamily::Simos.info().unwrap();
        let patch = info.patch.as_ref().unwrap();

        let (window_start, window_end) = patch.ecc_windows[0];
        assert_eq!(patch.transfer_size(window_start), patch.ecc_chunk);
        assert_eq!(patch.transfer_size(window_end - 7), patch.ecc_chunk);
        // Right below a window the chunk shrinks so it does not cross in.
        assert_eq!(patch.transfer_size(window_start - 0x10), 0x10);
        // Far away from any window, full-size chunks.
        assert_eq!(
            patch.transfer_size(window_end + 0x10_0000),
            patch.default_chunk
        );
    }

    #[test]
    fn simos_patch_targets_temporary_boot_block() {
        let info = FlashFamily::Simos.info().unwrap();
        let patch = info.patch.as_ref().unwrap();
        // Block 6 is only reachable through the patch flow.
        assert!(!info.flashable_blocks().contains(&6));
        assert!(info.base_address(6).is_ok());
        assert_eq!(6 - patch.block_offset, 1);
    }
}
