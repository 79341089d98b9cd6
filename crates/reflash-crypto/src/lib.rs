//! reflash-crypto - ciphers and codecs for ECU firmware handling
//!
//! This crate collects the byte-level primitives shared by the
//! distribution decoder and the flash preparer:
//!
//! - [`BlockCipher`]: the per-family payload ciphers (AES-128-CBC,
//!   counter-XOR, progressive substitution)
//! - [`stream`]: the rolling stream cipher wrapped around vendor
//!   distribution files
//! - [`lzss`]: the windowed LZSS codec used for outgoing payloads and the
//!   raw LZSS10 decoder used for vendor payloads
//! - [`sa2`]: the interpreter for the byte-coded seed/key program that
//!   answers the controller's security-access challenge
//!
//! All primitives are pure functions over byte slices; nothing in this
//! crate performs I/O or suspends.

pub mod cipher;
pub mod lzss;
pub mod sa2;
pub mod stream;

pub use cipher::{BlockCipher, CryptoError, SubstitutionTable, AES_BLOCK_SIZE};
pub use lzss::{LzssError, Padding};
pub use sa2::SeedKeyError;
