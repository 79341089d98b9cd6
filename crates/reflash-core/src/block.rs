//! Logical firmware segments

use serde::{Deserialize, Serialize};

/// A named, numbered, contiguous firmware segment.
///
/// Blocks come out of a decoded distribution file or a flat image, get
/// their checksums repaired in place, and are then consumed by
/// [`crate::prepare::prepare_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u16,
    pub name: String,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(number: u16, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            number,
            name: name.into(),
            data,
        }
    }
}

/// A block that has been checksummed, compressed and encrypted, carrying
/// everything the UDS orchestrator needs. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedBlock {
    pub number: u16,
    pub name: String,
    /// Spare-part number this block was built for.
    pub box_code: String,
    /// Compression identifier, the high DFI nibble of RequestDownload.
    pub compression: u8,
    /// Encryption identifier, the low DFI nibble of RequestDownload.
    pub encryption: u8,
    /// Whether the target region is erased before download.
    pub should_erase: bool,
    /// Checksum word handed to the post-transfer checksum routine,
    /// computed over the plain (repaired, uncompressed) block bytes.
    pub uds_checksum: [u8; 4],
    /// The encrypted transfer payload.
    #[serde(with = "serde_bytes_hex")]
    pub data: Vec<u8>,
}

impl PreparedBlock {
    /// DataFormatIdentifier byte for RequestDownload.
    pub fn data_format_identifier(&self) -> u8 {
        (self.compression << 4) | (self.encryption & 0x0F)
    }
}

/// Hex-string serde for payload bytes, so prepared blocks stored as JSON
/// stay diffable.
mod serde_bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_format_identifier_packs_nibbles() {
        let block = PreparedBlock {
            number: 5,
            name: "CAL".into(),
            box_code: "8V0906259H".into(),
            compression: 0xA,
            encryption: 0xA,
            should_erase: true,
            uds_checksum: [0; 4],
            data: vec![],
        };
        assert_eq!(block.data_format_identifier(), 0xAA);
    }

    #[test]
    fn prepared_block_json_round_trip() {
        let block = PreparedBlock {
            number: 2,
            name: "ASW1".into(),
            box_code: "8V0906259H".into(),
            compression: 0xA,
            encryption: 0xA,
            should_erase: true,
            uds_checksum: [0xDE, 0xAD, 0xBE, 0xEF],
            data: vec![1, 2, 3, 4],
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("01020304"));
        let back: PreparedBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, block.data);
        assert_eq!(back.uds_checksum, block.uds_checksum);
    }
}
