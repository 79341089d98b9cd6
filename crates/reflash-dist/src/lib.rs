//! reflash-dist - vendor firmware-distribution decoder
//!
//! Distribution files arrive as three nested layers:
//!
//! ```text
//! rolling stream cipher
//!   └─ ZIP archive
//!        └─ ODX-style XML document
//!             └─ FLASHDATA segments (hex, block-cipher, LZSS10)
//! ```
//!
//! [`decode`] unwraps all of them and yields decrypted, decompressed
//! segments plus the box codes the file declares itself valid for. The
//! box codes are surfaced, not enforced; the pre-flight check lives in
//! the flashing layer.

mod xml;

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, info};

use reflash_core::{Block, FamilyError, FlashInfo};
use reflash_crypto::{lzss, stream, CryptoError, LzssError};

/// Key material for the outer stream cipher, shared by all families.
pub const DISTRIBUTION_KEY: &[u8] = &[
    0x3A, 0x91, 0x5C, 0xE0, 0x27, 0x84, 0x49, 0xD2, 0x6E, 0xB7, 0x10, 0xF5, 0x8B, 0x3C, 0xA6,
    0x71,
];

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Distribution container is not a valid archive: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error("Reading the archive entry failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Distribution XML is malformed: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Distribution archive contains no flash description document")]
    MissingDocument,

    #[error("FLASHDATA '{id}' carries invalid hex")]
    BadHex { id: String },

    #[error("FLASHDATA '{id}' has no uncompressed size reference")]
    MissingSize { id: String },

    #[error("Decompressing FLASHDATA '{id}' failed: {source}")]
    Decompress { id: String, source: LzssError },

    #[error(transparent)]
    Family(#[from] FamilyError),
}

/// One decoded flash segment.
#[derive(Debug, Clone)]
pub struct FlashSegment {
    pub id: String,
    pub name: String,
    /// An erase marker describes a region to wipe and carries no data.
    pub erase_only: bool,
    /// Decrypted, decompressed payload (empty for erase markers).
    pub data: Vec<u8>,
}

/// A fully unwrapped distribution file.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub segments: Vec<FlashSegment>,
    /// Spare-part numbers this file declares itself flashable onto.
    pub box_codes: Vec<String>,
}

impl Distribution {
    /// Map the data-bearing segments onto the family's named blocks.
    pub fn into_blocks(self, info: &FlashInfo) -> Result<Vec<Block>, DistributionError> {
        self.segments
            .into_iter()
            .filter(|segment| !segment.erase_only)
            .map(|segment| {
                let number = info.block_to_number(&segment.name)?;
                Ok(Block::new(number, info.block_name(number), segment.data))
            })
            .collect()
    }
}

/// Decode a distribution file with the standard key material.
pub fn decode(info: &FlashInfo, raw: &[u8]) -> Result<Distribution, DistributionError> {
    decode_with_key(info, DISTRIBUTION_KEY, raw)
}

/// Decode a distribution file: stream cipher, ZIP, XML, then per-segment
/// block-cipher decrypt and LZSS10 decompression.
pub fn decode_with_key(
    info: &FlashInfo,
    key_material: &[u8],
    raw: &[u8],
) -> Result<Distribution, DistributionError> {
    let plain = stream::apply(key_material, raw)?;
    let document = read_archive_document(&plain)?;
    let parsed = xml::parse(&document)?;

    let mut segments = Vec::with_capacity(parsed.segments.len());
    for raw_segment in parsed.segments {
        let payload = decode_hex(&raw_segment.id, &raw_segment.payload_hex)?;

        // A two-hex-character payload is an erase marker, not data.
        if payload.len() <= 1 {
            debug!(id = %raw_segment.id, "segment is an erase marker");
            segments.push(FlashSegment {
                id: raw_segment.id,
                name: raw_segment.name,
                erase_only: true,
                data: Vec::new(),
            });
            continue;
        }

        let size = raw_segment
            .uncompressed_size
            .ok_or_else(|| DistributionError::MissingSize {
                id: raw_segment.id.clone(),
            })?;
        let decrypted = info.cipher.decrypt(&payload)?;
        let data = lzss::decompress_raw_lzss10(&decrypted, size).map_err(|source| {
            DistributionError::Decompress {
                id: raw_segment.id.clone(),
                source,
            }
        })?;

        debug!(id = %raw_segment.id, name = %raw_segment.name, size, "decoded segment");
        segments.push(FlashSegment {
            id: raw_segment.id,
            name: raw_segment.name,
            erase_only: false,
            data,
        });
    }

    info!(
        segments = segments.len(),
        box_codes = parsed.box_codes.len(),
        "decoded distribution file"
    );
    Ok(Distribution {
        segments,
        box_codes: parsed.box_codes,
    })
}

/// Pull the single XML document out of the decrypted ZIP container.
fn read_archive_document(plain: &[u8]) -> Result<String, DistributionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(plain))?;
    if archive.len() == 0 {
        return Err(DistributionError::MissingDocument);
    }

    let mut index = 0;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.name().to_ascii_lowercase().ends_with(".xml") {
            index = i;
            break;
        }
    }

    let mut entry = archive.by_index(index)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

fn decode_hex(id: &str, payload: &str) -> Result<Vec<u8>, DistributionError> {
    let compact: String = payload.split_whitespace().collect();
    hex::decode(&compact).map_err(|_| DistributionError::BadHex { id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use reflash_core::FlashFamily;

    /// Raw LZSS10 stream that emits `data` as plain literals.
    fn lzss10_literals(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(8) {
            out.push(0x00);
            out.extend_from_slice(chunk);
        }
        out
    }

    fn build_document(payload_hex: &str, size: usize) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<FLASH>
  <ECU-MEMS>
    <ECU-MEM>
      <MEM>
        <FLASHDATAS>
          <FLASHDATA ID="fd.cal">
            <LONG-NAME>CAL</LONG-NAME>
            <DATA>{payload_hex}</DATA>
          </FLASHDATA>
          <FLASHDATA ID="fd.erase">
            <LONG-NAME>ERASE-ALL</LONG-NAME>
            <DATA>00</DATA>
          </FLASHDATA>
        </FLASHDATAS>
        <DATABLOCKS>
          <DATABLOCK ID="db.cal">
            <FLASHDATA-REF ID-REF="fd.cal"/>
            <SEGMENTS>
              <SEGMENT>
                <UNCOMPRESSED-SIZE>{size}</UNCOMPRESSED-SIZE>
              </SEGMENT>
            </SEGMENTS>
          </DATABLOCK>
        </DATABLOCKS>
        <SESSIONS>
          <SESSION>
            <EXPECTED-IDENTS>
              <EXPECTED-IDENT>
                <IDENT-VALUES>
                  <IDENT-VALUE>8V0906259H</IDENT-VALUE>
                  <IDENT-VALUE>8V0906259K</IDENT-VALUE>
                </IDENT-VALUES>
              </EXPECTED-IDENT>
            </EXPECTED-IDENTS>
          </SESSION>
        </SESSIONS>
      </MEM>
    </ECU-MEM>
  </ECU-MEMS>
</FLASH>"#
        )
    }

    fn build_distribution(document: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file("flashdata.xml", options).unwrap();
            writer.write_all(document.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        stream::apply(DISTRIBUTION_KEY, &cursor.into_inner()).unwrap()
    }

    #[test]
    fn full_pipeline_round_trip() {
        let info = FlashFamily::Simos.info().unwrap();
        // 128 literal bytes become 144 stream bytes, AES-aligned.
        let plain: Vec<u8> = (0..128u32).map(|i| (i * 5 % 256) as u8).collect();
        let encrypted = info.cipher.encrypt(&lzss10_literals(&plain)).unwrap();
        let document = build_document(&hex::encode_upper(encrypted), plain.len());
        let raw = build_distribution(&document);

        let distribution = decode(&info, &raw).unwrap();
        assert_eq!(
            distribution.box_codes,
            vec!["8V0906259H".to_string(), "8V0906259K".to_string()]
        );
        assert_eq!(distribution.segments.len(), 2);

        let cal = &distribution.segments[0];
        assert_eq!(cal.name, "CAL");
        assert!(!cal.erase_only);
        assert_eq!(cal.data, plain);

        let erase = &distribution.segments[1];
        assert!(erase.erase_only);
        assert!(erase.data.is_empty());

        let blocks = distribution.into_blocks(&info).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 5);
        assert_eq!(blocks[0].data, plain);
    }

    #[test]
    fn wrong_uncompressed_size_is_fatal() {
        let info = FlashFamily::Simos.info().unwrap();
        let plain: Vec<u8> = (0..128u32).map(|i| i as u8).collect();
        let encrypted = info.cipher.encrypt(&lzss10_literals(&plain)).unwrap();
        // Declare more bytes than the stream can produce.
        let document = build_document(&hex::encode_upper(encrypted), plain.len() + 64);
        let raw = build_distribution(&document);

        let err = decode(&info, &raw).unwrap_err();
        assert!(matches!(err, DistributionError::Decompress { .. }));
    }

    #[test]
    fn bad_hex_is_fatal() {
        let info = FlashFamily::Simos.info().unwrap();
        let document = build_document("NOT-HEX!", 16);
        let raw = build_distribution(&document);
        let err = decode(&info, &raw).unwrap_err();
        assert!(matches!(err, DistributionError::BadHex { .. }));
    }

    #[test]
    fn garbage_outer_bytes_are_not_an_archive() {
        let info = FlashFamily::Simos.info().unwrap();
        let err = decode(&info, &[0x55u8; 64]).unwrap_err();
        assert!(matches!(err, DistributionError::Container(_)));
    }
}
