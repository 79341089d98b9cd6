//! Rolling stream cipher wrapped around vendor distribution files
//!
//! Two 8-bit seeds evolve per byte while a key byte cycles through the
//! family key material. The keystream never depends on the data, so the
//! same function both encrypts and decrypts.

use crate::CryptoError;

/// Apply the stream cipher to `data` with the given key material.
pub fn apply(key_material: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key_material.is_empty() {
        return Err(CryptoError::EmptyKeyMaterial);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut first_seed: u32 = 0;
    let mut second_seed: u32 = 1;
    let mut key_index = 0usize;

    for &c in data {
        let k = key_material[key_index] as u32;
        first_seed = (first_seed.wrapping_add(k).wrapping_mul(3)) & 0xFF;
        out.push(c ^ first_seed as u8 ^ 0xFF ^ second_seed as u8 ^ k as u8);
        second_seed = (second_seed.wrapping_add(1).wrapping_mul(first_seed)) & 0xFF;
        key_index = (key_index + 1) % key_material.len();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_is_an_involution() {
        let key = b"0123456789abcdef";
        let plain: Vec<u8> = (0..500).map(|i| (i * 13 % 256) as u8).collect();
        let encrypted = apply(key, &plain).unwrap();
        assert_ne!(encrypted, plain);
        assert_eq!(apply(key, &encrypted).unwrap(), plain);
    }

    #[test]
    fn first_bytes_match_hand_computation() {
        // key byte 2: first = (0 + 2) * 3 = 6, stream = 6 ^ 0xFF ^ 1 ^ 2
        let out = apply(&[2], &[0x00, 0x00]).unwrap();
        assert_eq!(out[0], 0x06 ^ 0xFF ^ 0x01 ^ 0x02);
        // second = (1 + 1) * 6 = 12; first = (6 + 2) * 3 = 24
        assert_eq!(out[1], 24 ^ 0xFF ^ 12 ^ 0x02);
    }

    #[test]
    fn empty_key_material_is_rejected() {
        assert!(matches!(
            apply(&[], &[1, 2, 3]),
            Err(CryptoError::EmptyKeyMaterial)
        ));
    }
}
