//! LZSS codecs
//!
//! Two related schemes live here:
//!
//! - The windowed, bit-interleaved codec used for payloads we send to the
//!   controller. A set flag bit introduces an 8-bit literal; a clear flag
//!   bit introduces an `EI`-bit window offset and an `EJ`-bit
//!   (length - 2) match record.
//! - The raw "LZSS10" scheme found inside vendor distribution files:
//!   a flag byte carrying eight MSB-first flags, where a set flag means a
//!   big-endian 16-bit code of 6 count bits and 10 displacement bits.
//!
//! The windowed encoder is deterministic (greedy longest match), so the
//! same input always produces the same stream.

use thiserror::Error;

/// Window index bits; the dictionary holds `2^EI` bytes.
const EI: u32 = 10;
/// Match length bits; the longest match is `2^EJ + 1` bytes.
const EJ: u32 = 4;
/// Matches must be longer than this to beat emitting literals.
const P: usize = 1;

const N: usize = 1 << EI;
const F: usize = (1 << EJ) + 1;

/// Initial fill byte of the dictionary window. Encoder and decoder must
/// agree on it; every shipped family uses zero.
pub const WINDOW_FILL: u8 = 0x00;

#[derive(Debug, Error)]
pub enum LzssError {
    #[error("Compressed stream ended after {got} of {expected} output bytes")]
    Truncated { expected: usize, got: usize },

    #[error("Match displacement {disp} at output position {position} references unwritten data")]
    BadDisplacement { disp: usize, position: usize },
}

/// How the compressed stream is sized for the downstream cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Zero-pad to the AES block size, always appending at least one
    /// byte. This is what the controller expects for compressed blocks.
    #[default]
    CipherBlock,
    /// Emit the raw bit stream with no trailing bytes.
    None,
    /// Zero-pad to a 16-byte multiple only when the stream is misaligned.
    Exact,
}

struct BitWriter {
    out: Vec<u8>,
    current: u8,
    filled: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            current: 0,
            filled: 0,
        }
    }

    fn put_bits(&mut self, value: u32, count: u32) {
        for shift in (0..count).rev() {
            self.current = (self.current << 1) | ((value >> shift) & 1) as u8;
            self.filled += 1;
            if self.filled == 8 {
                self.out.push(self.current);
                self.current = 0;
                self.filled = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.out.push(self.current << (8 - self.filled));
        }
        self.out
    }
}

struct BitReader<'a> {
    src: &'a [u8],
    position: usize,
    current: u8,
    remaining: u32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            position: 0,
            current: 0,
            remaining: 0,
        }
    }

    fn read_bits(&mut self, count: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            if self.remaining == 0 {
                self.current = *self.src.get(self.position)?;
                self.position += 1;
                self.remaining = 8;
            }
            value = (value << 1) | ((self.current >> 7) & 1) as u32;
            self.current <<= 1;
            self.remaining -= 1;
        }
        Some(value)
    }
}

/// Compress `src` with the windowed codec and the default window fill.
pub fn compress(src: &[u8], padding: Padding) -> Vec<u8> {
    compress_with_fill(src, padding, WINDOW_FILL)
}

/// Compress with an explicit initial window byte.
pub fn compress_with_fill(src: &[u8], padding: Padding, fill: u8) -> Vec<u8> {
    let mut window = [fill; N];
    let mut r = N - F;
    let mut writer = BitWriter::new();
    let mut p = 0;

    while p < src.len() {
        let max_len = F.min(src.len() - p);
        let mut best_len = 0;
        let mut best_pos = 0;

        if max_len > P {
            for i in 0..N {
                // A match that reads positions the decoder is writing in
                // the same record would diverge; keep the read window at
                // least a full lookahead away from the cursor.
                let dist = (r + N - i) & (N - 1);
                if dist != 0 && dist < F {
                    continue;
                }
                let mut l = 0;
                while l < max_len && window[(i + l) & (N - 1)] == src[p + l] {
                    l += 1;
                }
                if l > best_len {
                    best_len = l;
                    best_pos = i;
                    if l == max_len {
                        break;
                    }
                }
            }
        }

        if best_len > P {
            writer.put_bits(0, 1);
            writer.put_bits(best_pos as u32, EI);
            writer.put_bits((best_len - 2) as u32, EJ);
            for k in 0..best_len {
                window[r] = src[p + k];
                r = (r + 1) & (N - 1);
            }
            p += best_len;
        } else {
            writer.put_bits(1, 1);
            writer.put_bits(src[p] as u32, 8);
            window[r] = src[p];
            r = (r + 1) & (N - 1);
            p += 1;
        }
    }

    let mut out = writer.finish();
    match padding {
        Padding::CipherBlock => {
            let pad = 16 - out.len() % 16;
            out.extend(std::iter::repeat(0u8).take(pad));
        }
        Padding::Exact => {
            if out.len() % 16 != 0 {
                let pad = 16 - out.len() % 16;
                out.extend(std::iter::repeat(0u8).take(pad));
            }
        }
        Padding::None => {}
    }
    out
}

/// Decompress a windowed-codec stream to exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>, LzssError> {
    decompress_with_fill(src, expected_len, WINDOW_FILL)
}

/// Decompress with an explicit initial window byte.
pub fn decompress_with_fill(
    src: &[u8],
    expected_len: usize,
    fill: u8,
) -> Result<Vec<u8>, LzssError> {
    let mut out = Vec::with_capacity(expected_len);
    // The window is a double-length ring but only ever masked with
    // N - 1.
    let mut window = vec![fill; N * 2];
    let mut r = N - F;
    let mut reader = BitReader::new(src);

    while out.len() < expected_len {
        let Some(flag) = reader.read_bits(1) else {
            break;
        };
        if flag == 1 {
            let Some(c) = reader.read_bits(8) else {
                break;
            };
            out.push(c as u8);
            window[r] = c as u8;
            r = (r + 1) & (N - 1);
        } else {
            let (Some(i), Some(j)) = (reader.read_bits(EI), reader.read_bits(EJ)) else {
                break;
            };
            for k in 0..(j as usize + 2) {
                let c = window[(i as usize + k) & (N - 1)];
                out.push(c);
                window[r] = c;
                r = (r + 1) & (N - 1);
                if out.len() == expected_len {
                    break;
                }
            }
        }
    }

    if out.len() < expected_len {
        return Err(LzssError::Truncated {
            expected: expected_len,
            got: out.len(),
        });
    }
    Ok(out)
}

/// Decode the raw LZSS10 scheme used for vendor distribution payloads.
///
/// Decoding stops once `expected_len` bytes have been produced, even in
/// the middle of a copy record.
pub fn decompress_raw_lzss10(src: &[u8], expected_len: usize) -> Result<Vec<u8>, LzssError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut idx = 0;

    let truncated = |got: usize| LzssError::Truncated {
        expected: expected_len,
        got,
    };

    'outer: while out.len() < expected_len {
        let flags = *src.get(idx).ok_or_else(|| truncated(out.len()))?;
        idx += 1;
        for bit in (0..8).rev() {
            if out.len() >= expected_len {
                break 'outer;
            }
            if flags >> bit & 1 == 0 {
                let literal = *src.get(idx).ok_or_else(|| truncated(out.len()))?;
                idx += 1;
                out.push(literal);
            } else {
                let hi = *src.get(idx).ok_or_else(|| truncated(out.len()))?;
                let lo = *src.get(idx + 1).ok_or_else(|| truncated(out.len()))?;
                idx += 2;
                let code = u16::from_be_bytes([hi, lo]);
                let count = (code >> 10) as usize;
                let disp = (code & 0x3FF) as usize;
                if disp == 0 || disp > out.len() {
                    return Err(LzssError::BadDisplacement {
                        disp,
                        position: out.len(),
                    });
                }
                for _ in 0..count {
                    out.push(out[out.len() - disp]);
                    if out.len() == expected_len {
                        break;
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn round_trip_simple() {
        let data = b"the quick brown fox jumps over the lazy dog, the lazy dog sleeps";
        let compressed = compress(data, Padding::None);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn round_trip_repetitive_input_shrinks() {
        let data: Vec<u8> = b"ABCDEFGH".iter().cycle().take(4096).copied().collect();
        let compressed = compress(&data, Padding::None);
        assert!(compressed.len() < data.len() / 2);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn round_trip_random_input() {
        let mut rng = StdRng::seed_from_u64(42);
        for len in [0usize, 1, 15, 16, 17, 333, 5000] {
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let compressed = compress(&data, Padding::None);
            assert_eq!(decompress(&compressed, len).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn round_trip_leading_zeroes_match_window_fill() {
        // Leading zeroes match the pre-filled window immediately.
        let mut data = vec![0u8; 600];
        data.extend_from_slice(b"tail");
        let compressed = compress(&data, Padding::None);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn cipher_block_padding_is_aligned_and_non_empty() {
        for len in [0usize, 1, 100, 512] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let compressed = compress(&data, Padding::CipherBlock);
            assert_eq!(compressed.len() % 16, 0);
            assert!(!compressed.is_empty());
            if len > 0 {
                assert_eq!(decompress(&compressed, len).unwrap(), data);
            }
        }
    }

    #[test]
    fn exact_padding_is_aligned() {
        let data: Vec<u8> = (0..700).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&data, Padding::Exact);
        assert_eq!(compressed.len() % 16, 0);
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn round_trip_with_alternate_window_fill() {
        let mut data = vec![0xFFu8; 300];
        data.extend_from_slice(b"payload");
        let compressed = compress_with_fill(&data, Padding::None, 0xFF);
        assert_eq!(
            decompress_with_fill(&compressed, data.len(), 0xFF).unwrap(),
            data
        );
    }

    #[test]
    fn compression_is_deterministic() {
        let data: Vec<u8> = (0..2000).map(|i| (i * 31 % 253) as u8).collect();
        assert_eq!(
            compress(&data, Padding::CipherBlock),
            compress(&data, Padding::CipherBlock)
        );
    }

    #[test]
    fn truncated_stream_is_reported() {
        let data = b"some payload that will not fit";
        let compressed = compress(data, Padding::None);
        let err = decompress(&compressed[..compressed.len() / 2], data.len()).unwrap_err();
        assert!(matches!(err, LzssError::Truncated { .. }));
    }

    #[test]
    fn raw_lzss10_literals_and_copies() {
        // Seven literals, then a max-count copy with displacement 7,
        // then eight more copies; the declared size cuts the last one.
        let pattern = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let mut src = vec![0x01u8];
        src.extend_from_slice(&pattern);
        src.extend_from_slice(&[0xFC, 0x07]);
        src.push(0xFF);
        for _ in 0..8 {
            src.extend_from_slice(&[0xFC, 0x07]);
        }

        let out = decompress_raw_lzss10(&src, 0x200).unwrap();
        assert_eq!(out.len(), 0x200);
        for (i, &b) in out.iter().enumerate() {
            assert_eq!(b, pattern[i % 7], "mismatch at {i}");
        }
    }

    #[test]
    fn raw_lzss10_all_literals() {
        let mut src = Vec::new();
        for chunk in (0u8..32).collect::<Vec<_>>().chunks(8) {
            src.push(0x00);
            src.extend_from_slice(chunk);
        }
        let out = decompress_raw_lzss10(&src, 32).unwrap();
        assert_eq!(out, (0u8..32).collect::<Vec<_>>());
    }

    #[test]
    fn raw_lzss10_bad_displacement() {
        // A copy record before any output exists.
        let src = [0x80u8, 0x04, 0x01];
        let err = decompress_raw_lzss10(&src, 16).unwrap_err();
        assert!(matches!(err, LzssError::BadDisplacement { .. }));
    }

    #[test]
    fn raw_lzss10_truncated_input() {
        let src = [0x00u8, 0xAA];
        let err = decompress_raw_lzss10(&src, 16).unwrap_err();
        assert!(matches!(err, LzssError::Truncated { .. }));
    }
}
