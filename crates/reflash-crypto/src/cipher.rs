//! Per-family block ciphers
//!
//! Every controller family encrypts flash payloads with exactly one of
//! these ciphers; the family descriptor holds the variant. Encrypt and
//! decrypt are exact inverses for well-formed input.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES operates on whole blocks; callers pad compressed payloads to this.
pub const AES_BLOCK_SIZE: usize = 16;

/// The rolling-stream increment of the substitution cipher.
const SUBSTITUTION_STRIDE: u32 = 0x167;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Input length {0} is not a multiple of the AES block size")]
    UnalignedInput(usize),

    #[error("Substitution table is not a permutation (byte 0x{0:02X} appears twice)")]
    DuplicateTableEntry(u8),

    #[error("Substitution table has {0} bytes, expected 256")]
    BadTableSize(usize),

    #[error("Stream cipher key material is empty")]
    EmptyKeyMaterial,
}

/// A 256-byte keystream table together with its precomputed inverse.
///
/// The table must be a permutation of 0..=255; a duplicate entry would
/// make decryption lossy.
#[derive(Clone)]
pub struct SubstitutionTable {
    forward: [u8; 256],
    inverse: [u8; 256],
}

impl SubstitutionTable {
    pub fn new(table: &[u8]) -> Result<Self, CryptoError> {
        let forward: [u8; 256] = table
            .try_into()
            .map_err(|_| CryptoError::BadTableSize(table.len()))?;

        let mut seen = [false; 256];
        let mut inverse = [0u8; 256];
        for (i, &b) in forward.iter().enumerate() {
            if seen[b as usize] {
                return Err(CryptoError::DuplicateTableEntry(b));
            }
            seen[b as usize] = true;
            inverse[b as usize] = i as u8;
        }

        Ok(Self { forward, inverse })
    }
}

impl std::fmt::Debug for SubstitutionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubstitutionTable").finish_non_exhaustive()
    }
}

/// The cipher applied to flash payloads, selected per controller family.
#[derive(Debug, Clone)]
pub enum BlockCipher {
    /// AES-128-CBC with a fixed key and IV. No padding is applied here;
    /// callers guarantee 16-byte alignment.
    AesCbc { key: [u8; 16], iv: [u8; 16] },
    /// Byte i is XORed with `i mod 256`. Self-inverse.
    CounterXor,
    /// Progressive substitution driven by a 256-byte keystream table.
    Substitution(SubstitutionTable),
}

impl BlockCipher {
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            BlockCipher::AesCbc { key, iv } => {
                if data.len() % AES_BLOCK_SIZE != 0 {
                    return Err(CryptoError::UnalignedInput(data.len()));
                }
                let mut buf = data.to_vec();
                Aes128CbcDec::new(key.into(), iv.into())
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| CryptoError::UnalignedInput(data.len()))?;
                Ok(buf)
            }
            BlockCipher::CounterXor => Ok(counter_xor(data)),
            BlockCipher::Substitution(table) => Ok(substitution_decrypt(table, data)),
        }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            BlockCipher::AesCbc { key, iv } => {
                if data.len() % AES_BLOCK_SIZE != 0 {
                    return Err(CryptoError::UnalignedInput(data.len()));
                }
                let mut buf = data.to_vec();
                let len = buf.len();
                Aes128CbcEnc::new(key.into(), iv.into())
                    .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                    .map_err(|_| CryptoError::UnalignedInput(len))?;
                Ok(buf)
            }
            BlockCipher::CounterXor => Ok(counter_xor(data)),
            BlockCipher::Substitution(table) => Ok(substitution_encrypt(table, data)),
        }
    }

    /// Block size the caller must align to before encrypting.
    pub fn block_size(&self) -> usize {
        match self {
            BlockCipher::AesCbc { .. } => AES_BLOCK_SIZE,
            _ => 1,
        }
    }
}

fn counter_xor(data: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ (i & 0xFF) as u8)
        .collect()
}

/// Walks the keystream table with a state of (offset, rolling stream,
/// previous output byte). The inverse below must mirror every state
/// update exactly.
fn substitution_decrypt(table: &SubstitutionTable, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut offset: u32 = 0;
    let mut rolling_stream: u32 = 0;
    let mut last_data: u32 = 0;

    for &d in data {
        let cipher_byte = table.forward[((d as u32 + offset) & 0xFF) as usize];
        offset = offset.wrapping_add(cipher_byte as u32 + last_data);
        rolling_stream = rolling_stream.wrapping_add(SUBSTITUTION_STRIDE);
        offset = offset.wrapping_add(table.forward[((rolling_stream >> 8) & 0xFF) as usize] as u32);
        last_data = cipher_byte as u32;
        out.push(cipher_byte);
    }
    out
}

fn substitution_encrypt(table: &SubstitutionTable, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut offset: u32 = 0;
    let mut rolling_stream: u32 = 0;
    let mut last_data: u32 = 0;

    for &c in data {
        let index = table.inverse[c as usize];
        out.push(index.wrapping_sub((offset & 0xFF) as u8));
        offset = offset.wrapping_add(c as u32 + last_data);
        rolling_stream = rolling_stream.wrapping_add(SUBSTITUTION_STRIDE);
        offset = offset.wrapping_add(table.forward[((rolling_stream >> 8) & 0xFF) as usize] as u32);
        last_data = c as u32;
    }
    out
}
