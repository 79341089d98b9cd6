//! ODX-style flash description parsing
//!
//! The document of interest lives under
//! `FLASH/ECU-MEMS/ECU-MEM/MEM`: `FLASHDATAS` carries the hex payloads,
//! `DATABLOCKS` cross-references them with their uncompressed sizes, and
//! `SESSIONS` enumerates the box codes the file may be flashed onto.

use roxmltree::{Document, Node};
use tracing::warn;

use crate::DistributionError;

#[derive(Debug)]
pub(crate) struct RawSegment {
    pub id: String,
    pub name: String,
    pub payload_hex: String,
    pub uncompressed_size: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct RawDocument {
    pub segments: Vec<RawSegment>,
    pub box_codes: Vec<String>,
}

pub(crate) fn parse(text: &str) -> Result<RawDocument, DistributionError> {
    let document = Document::parse(text)?;
    let root = document.root_element();
    if !root.has_tag_name("FLASH") {
        return Err(DistributionError::MissingDocument);
    }

    let Some(mem) = descend(root, &["ECU-MEMS", "ECU-MEM", "MEM"]) else {
        return Err(DistributionError::MissingDocument);
    };

    let mut segments = Vec::new();
    if let Some(flashdatas) = child(mem, "FLASHDATAS") {
        for flashdata in children(flashdatas, "FLASHDATA") {
            let Some(id) = flashdata.attribute("ID") else {
                warn!("FLASHDATA without an ID attribute, skipping");
                continue;
            };
            let name = child(flashdata, "LONG-NAME")
                .and_then(|n| n.text())
                .unwrap_or(id)
                .trim()
                .to_string();
            let payload_hex = child(flashdata, "DATA")
                .and_then(|n| n.text())
                .unwrap_or_default()
                .trim()
                .to_string();

            segments.push(RawSegment {
                id: id.to_string(),
                name,
                payload_hex,
                uncompressed_size: uncompressed_size_for(mem, id),
            });
        }
    }

    Ok(RawDocument {
        segments,
        box_codes: box_codes(mem),
    })
}

/// Resolve `DATABLOCK/FLASHDATA-REF[@ID-REF=id]/../SEGMENTS/SEGMENT/
/// UNCOMPRESSED-SIZE` for one FLASHDATA identifier.
fn uncompressed_size_for(mem: Node<'_, '_>, id: &str) -> Option<usize> {
    let datablocks = child(mem, "DATABLOCKS")?;
    for datablock in children(datablocks, "DATABLOCK") {
        let references = children(datablock, "FLASHDATA-REF")
            .any(|reference| reference.attribute("ID-REF") == Some(id));
        if !references {
            continue;
        }
        let size = descend(datablock, &["SEGMENTS", "SEGMENT", "UNCOMPRESSED-SIZE"])?
            .text()?
            .trim()
            .parse()
            .ok()?;
        return Some(size);
    }
    None
}

/// `SESSIONS/SESSION/EXPECTED-IDENTS/EXPECTED-IDENT/IDENT-VALUES/
/// IDENT-VALUE` text values across all sessions.
fn box_codes(mem: Node<'_, '_>) -> Vec<String> {
    let mut codes = Vec::new();
    let Some(sessions) = child(mem, "SESSIONS") else {
        return codes;
    };
    for session in children(sessions, "SESSION") {
        let Some(idents) = child(session, "EXPECTED-IDENTS") else {
            continue;
        };
        for ident in children(idents, "EXPECTED-IDENT") {
            let Some(values) = child(ident, "IDENT-VALUES") else {
                continue;
            };
            for value in children(values, "IDENT-VALUE") {
                if let Some(text) = value.text() {
                    let text = text.trim();
                    if !text.is_empty() && !codes.iter().any(|c| c == text) {
                        codes.push(text.to_string());
                    }
                }
            }
        }
    }
    codes
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.has_tag_name(name))
}

fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |current, &name| child(current, name))
}
