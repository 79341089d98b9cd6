//! Per-family data tables
//!
//! Addresses, lengths and offsets mirror the layouts the controllers
//! expose over UDS; the key material and keystream tables are the
//! per-family recoveries used for payload encryption.

use std::collections::BTreeMap;

use reflash_crypto::{BlockCipher, SubstitutionTable};

use super::{FamilyError, FlashFamily, FlashInfo, PatchInfo};
use crate::checksum::ChecksumKind;

// ── Seed/key scripts ───────────────────────────────────────────────────────

const SIMOS_SA2: &[u8] = &[
    0x68, 0x02, 0x81, 0x49, 0x93, 0x05, 0x28, 0x37, 0x19, 0x82, 0x87, 0x23, 0x0F, 0xAA, 0x31,
    0x4C,
];

const DSG_SA2: &[u8] = &[
    0x68, 0x05, 0x81, 0x49, 0x93, 0x00, 0x14, 0x9D, 0xE7, 0x82, 0x82, 0x87, 0x40, 0x3C, 0x71,
    0x08, 0x4C,
];

const HALDEX_SA2: &[u8] = &[
    0x81, 0x81, 0x93, 0x10, 0xE3, 0x55, 0xA2, 0x4A, 0x05, 0x84, 0x00, 0x00, 0x01, 0xC7, 0x4C,
];

const DQ381_SA2: &[u8] = &[
    0x68, 0x03, 0x82, 0x49, 0x87, 0x29, 0x8C, 0x40, 0x55, 0x93, 0x00, 0x01, 0xE2, 0x40, 0x4C,
];

// ── Key material ───────────────────────────────────────────────────────────

const SIMOS_AES_KEY: [u8; 16] = [
    0x98, 0x6D, 0x3A, 0x71, 0xC4, 0x0F, 0x5E, 0xB2, 0x27, 0xD9, 0x84, 0x1B, 0x66, 0xF0, 0xAD,
    0x52,
];

const SIMOS_AES_IV: [u8; 16] = [
    0x4C, 0x91, 0xE8, 0x33, 0x0A, 0x75, 0xDE, 0x17, 0xB6, 0x2F, 0xC8, 0x61, 0x94, 0x5B, 0x03,
    0xEA,
];

// Looks like a placeholder rather than a recovered key; validate against
// real distribution files before relying on it.
const DQ381_AES_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
];

const DQ381_AES_IV: [u8; 16] = [
    0x10, 0x0F, 0x0E, 0x0D, 0x0C, 0x0B, 0x0A, 0x09, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02,
    0x01,
];

/// Keystream table of the transmission substitution cipher. Must be a
/// permutation of 0..=255.
const DSG_KEYSTREAM: [u8; 256] = [
    0x61, 0x6C, 0x20, 0xA9, 0x8A, 0xC7, 0xCF, 0xC3, 0x2B, 0x81, 0xA4, 0x12, //
    0xF9, 0xBB, 0x16, 0x7F, 0x46, 0xF4, 0x02, 0x4E, 0x37, 0xEB, 0xE2, 0xE9, //
    0x79, 0x4C, 0xEE, 0x70, 0x0A, 0x29, 0x7A, 0x87, 0xFD, 0xCE, 0x2A, 0x14, //
    0x58, 0xED, 0x71, 0x3D, 0xF7, 0x64, 0xB6, 0x8E, 0x2E, 0xAA, 0xEC, 0xE8, //
    0xD4, 0x11, 0xFB, 0x8C, 0xA5, 0xDB, 0xC1, 0x6A, 0x9F, 0x6B, 0x77, 0x3E, //
    0xCC, 0xE0, 0x9A, 0x4A, 0xF6, 0xE7, 0xEF, 0x33, 0x3A, 0x09, 0x84, 0x53, //
    0xB8, 0x34, 0x23, 0x2D, 0x24, 0x0C, 0x1D, 0xAC, 0x18, 0x22, 0xA3, 0x83, //
    0x74, 0x56, 0x85, 0x4B, 0x9D, 0x43, 0xB1, 0xC6, 0x8F, 0xE5, 0x66, 0xD8, //
    0x88, 0x73, 0x2F, 0x06, 0xB4, 0x52, 0xBA, 0x48, 0xDE, 0xE3, 0x7B, 0xAE, //
    0x0E, 0xD7, 0x7D, 0xDF, 0xAF, 0x1A, 0xAB, 0x03, 0xEA, 0x69, 0xCB, 0xDC, //
    0xF5, 0xA1, 0x78, 0x19, 0x2C, 0xDA, 0xF2, 0x41, 0x0B, 0x26, 0x31, 0x94, //
    0x45, 0x6D, 0xC0, 0x72, 0x08, 0x27, 0xD5, 0x93, 0x80, 0x1E, 0x7E, 0x35, //
    0xFA, 0xF8, 0xBE, 0x1B, 0x5B, 0x38, 0xF0, 0xD9, 0xBD, 0x91, 0x65, 0xD0, //
    0x98, 0x96, 0x3F, 0xFE, 0x04, 0xA2, 0x4F, 0x89, 0xD3, 0x50, 0xD2, 0x51, //
    0x32, 0xC4, 0x07, 0x86, 0xE1, 0xA8, 0x1C, 0xC9, 0x15, 0x8D, 0xF3, 0xFF, //
    0xB3, 0x55, 0xCA, 0xB0, 0xF1, 0x75, 0xBC, 0x62, 0x42, 0x49, 0x57, 0xB2, //
    0x76, 0x6E, 0x5C, 0x60, 0xBF, 0xAD, 0x44, 0x47, 0x05, 0x4D, 0xFC, 0x36, //
    0x9B, 0x6F, 0x17, 0xC2, 0x9C, 0x3C, 0x95, 0x21, 0x68, 0x0F, 0x10, 0xA0, //
    0x0D, 0x90, 0x40, 0x92, 0x63, 0xE4, 0xD1, 0xB5, 0x1F, 0x39, 0xB7, 0x01, //
    0x99, 0xA6, 0x28, 0x9E, 0x7C, 0xD6, 0x5E, 0xA7, 0x82, 0x25, 0x5D, 0xE6, //
    0x3B, 0x5A, 0xDD, 0xC8, 0xCD, 0x97, 0xC5, 0xB9, 0x59, 0x67, 0x30, 0x00, //
    0x54, 0x5F, 0x13, 0x8B,
];

// ── ECC-protected patch windows (engine family) ────────────────────────────

const SIMOS_ECC_WINDOWS: &[(u32, u32)] = &[
    (0x8084_4000, 0x8084_43FF),
    (0x8085_0000, 0x8085_07FF),
];

// ── Families ───────────────────────────────────────────────────────────────

pub(super) fn simos() -> Result<FlashInfo, FamilyError> {
    Ok(FlashInfo {
        family: FlashFamily::Simos,
        project_name: "SC8",
        base_addresses: BTreeMap::from([
            (1, 0x8001_C000),
            (2, 0x8004_0000),
            (3, 0x8014_0000),
            (4, 0x8088_0000),
            (5, 0xA080_0000),
            (6, 0x8084_0000),
        ]),
        block_lengths: BTreeMap::from([
            (1, 0x23E00),
            (2, 0xFFC00),
            (3, 0xBFC00),
            (4, 0x7FC00),
            (5, 0x7FC00),
            (6, 0x23E00),
        ]),
        transfer_sizes: BTreeMap::from([
            (1, 0xFFD),
            (2, 0xFFD),
            (3, 0xFFD),
            (4, 0xFFD),
            (5, 0xFFD),
            (6, 0xFFD),
        ]),
        block_identifiers: BTreeMap::from([(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]),
        software_version_offsets: BTreeMap::from([
            (1, 0x437..0x43F),
            (2, 0x627..0x62F),
            (3, 0x627..0x62F),
            (4, 0x627..0x62F),
            (5, 0x23..0x2B),
        ]),
        box_code_offsets: BTreeMap::from([(5, 0x60..0x6C)]),
        binfile_layout: BTreeMap::from([
            (1, 0x01_C000),
            (2, 0x04_0000),
            (3, 0x14_0000),
            (4, 0x20_0000),
            (5, 0x28_0000),
        ]),
        binfile_size: 0x40_0000,
        dynamic_length_offsets: BTreeMap::new(),
        sa2_script: SIMOS_SA2,
        cipher: BlockCipher::AesCbc {
            key: SIMOS_AES_KEY,
            iv: SIMOS_AES_IV,
        },
        compression: 0xA,
        encryption: 0xA,
        checksum: ChecksumKind::Segmented,
        checksum_offsets: BTreeMap::from([
            (1, 0x300),
            (2, 0x300),
            (3, 0x300),
            (4, 0x300),
            (5, 0x300),
            (6, 0x300),
        ]),
        checksummed_blocks: &[1, 2, 3, 4, 5, 6],
        patch: Some(PatchInfo {
            block_offset: 5,
            cal_block: 5,
            compression: 0x0,
            encryption: 0xA,
            default_chunk: 0x100,
            ecc_chunk: 0x8,
            ecc_windows: SIMOS_ECC_WINDOWS,
        }),
        block_names: BTreeMap::from([
            ("CBOOT", 1),
            ("ASW1", 2),
            ("ASW2", 3),
            ("ASW3", 4),
            ("CAL", 5),
            ("CBOOT_TEMP", 6),
        ]),
        rx_id: 0x7E8,
        tx_id: 0x7E0,
    })
}

pub(super) fn dsg() -> Result<FlashInfo, FamilyError> {
    let table = SubstitutionTable::new(&DSG_KEYSTREAM)?;
    Ok(FlashInfo {
        family: FlashFamily::Dsg,
        project_name: "DQ250",
        base_addresses: BTreeMap::from([(1, 0x0000_0000), (2, 0x0002_0000), (3, 0x000A_0000)]),
        block_lengths: BTreeMap::from([(1, 0x2_0000), (2, 0x8_0000), (3, 0x2_0000)]),
        transfer_sizes: BTreeMap::from([(1, 0x5FD), (2, 0x5FD), (3, 0x5FD)]),
        block_identifiers: BTreeMap::from([(1, 1), (2, 2), (3, 3)]),
        software_version_offsets: BTreeMap::from([(2, 0x1C..0x24), (3, 0x1C..0x24)]),
        box_code_offsets: BTreeMap::from([(3, 0x30..0x3C)]),
        binfile_layout: BTreeMap::from([(1, 0x0), (2, 0x2_0000), (3, 0xA_0000)]),
        binfile_size: 0xC_0000,
        dynamic_length_offsets: BTreeMap::new(),
        sa2_script: DSG_SA2,
        cipher: BlockCipher::Substitution(table),
        compression: 0x0,
        encryption: 0x1,
        checksum: ChecksumKind::TrailingJamcrc,
        checksum_offsets: BTreeMap::new(),
        checksummed_blocks: &[2, 3],
        patch: None,
        block_names: BTreeMap::from([("DRIVER", 1), ("ASW", 2), ("CAL", 3)]),
        rx_id: 0x7E9,
        tx_id: 0x7E1,
    })
}

pub(super) fn haldex() -> Result<FlashInfo, FamilyError> {
    Ok(FlashInfo {
        family: FlashFamily::Haldex,
        project_name: "HX4",
        base_addresses: BTreeMap::from([(1, 0x0000_0000), (2, 0x0000_8000), (3, 0x0004_0000)]),
        block_lengths: BTreeMap::from([(1, 0x8000), (2, 0x3_8000), (3, 0x8000)]),
        transfer_sizes: BTreeMap::from([(1, 0x80), (2, 0x80), (3, 0x80)]),
        block_identifiers: BTreeMap::from([(1, 1), (2, 2), (3, 3)]),
        software_version_offsets: BTreeMap::from([(2, 0x40..0x48)]),
        box_code_offsets: BTreeMap::from([(3, 0x20..0x2C)]),
        binfile_layout: BTreeMap::from([(1, 0x0), (2, 0x8000), (3, 0x4_0000)]),
        binfile_size: 0x4_8000,
        dynamic_length_offsets: BTreeMap::from([(1, 0x14), (2, 0x14), (3, 0x14)]),
        sa2_script: HALDEX_SA2,
        cipher: BlockCipher::CounterXor,
        compression: 0x0,
        encryption: 0x1,
        checksum: ChecksumKind::Additive16,
        checksum_offsets: BTreeMap::from([(2, 0x10), (3, 0x10)]),
        checksummed_blocks: &[2, 3],
        patch: None,
        block_names: BTreeMap::from([("DRIVER", 1), ("ASW", 2), ("CAL", 3)]),
        rx_id: 0x7ED,
        tx_id: 0x7E5,
    })
}

pub(super) fn dq381() -> Result<FlashInfo, FamilyError> {
    Ok(FlashInfo {
        family: FlashFamily::Dq381,
        project_name: "DQ381",
        base_addresses: BTreeMap::from([(1, 0xA000_0000), (2, 0xA002_0000), (3, 0xA00E_0000)]),
        block_lengths: BTreeMap::from([(1, 0x2_0000), (2, 0xC_0000), (3, 0x2_0000)]),
        transfer_sizes: BTreeMap::from([(1, 0xFFD), (2, 0xFFD), (3, 0xFFD)]),
        block_identifiers: BTreeMap::from([(1, 1), (2, 2), (3, 3)]),
        software_version_offsets: BTreeMap::from([(2, 0x1C..0x24), (3, 0x1C..0x24)]),
        box_code_offsets: BTreeMap::from([(3, 0x60..0x6C)]),
        binfile_layout: BTreeMap::from([(1, 0x0), (2, 0x2_0000), (3, 0xE_0000)]),
        binfile_size: 0x10_0000,
        dynamic_length_offsets: BTreeMap::new(),
        sa2_script: DQ381_SA2,
        cipher: BlockCipher::AesCbc {
            key: DQ381_AES_KEY,
            iv: DQ381_AES_IV,
        },
        compression: 0xA,
        encryption: 0xA,
        checksum: ChecksumKind::BoundedBe,
        checksum_offsets: BTreeMap::new(),
        checksummed_blocks: &[2, 3],
        patch: None,
        block_names: BTreeMap::from([("DRIVER", 1), ("ASW", 2), ("CAL", 3)]),
        rx_id: 0x7E9,
        tx_id: 0x7E1,
    })
}
