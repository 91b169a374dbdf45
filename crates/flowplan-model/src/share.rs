//! Share-string codec for exporting a page to the clipboard.
//!
//! Wire format: the byte sequence `"YAFC\n"`, `"ProjectPage\n"`,
//! `"<version>\n"`, `"<reserved>\n"`, `"\n"`, followed by the page's JSON
//! document; the whole sequence deflate-compressed and Base64-encoded.
//!
//! Readers reject a header mismatch, a future major version, or a
//! non-empty second reserved line; any newer version yields a non-fatal
//! warning. Decoding never mutates project state.

use crate::table::{LinkAlgorithm, PlanArena, TableKey};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use flowplan_core::catalog::Catalog;
use std::io::{Read, Write};

/// First header line.
pub const SHARE_MAGIC: &str = "YAFC";
/// Second header line.
pub const SHARE_KIND: &str = "ProjectPage";
/// Version written by this build, `major.minor`.
pub const SHARE_VERSION: (u32, u32) = (1, 0);

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while decoding a share string. All are recoverable; the
/// caller reports them and keeps its state.
#[derive(Debug, thiserror::Error)]
pub enum ShareStringError {
    #[error("not a valid Base64 string")]
    Base64(#[from] base64::DecodeError),
    #[error("compressed payload is corrupt: {0}")]
    Inflate(std::io::Error),
    #[error("header mismatch: expected {expected:?}, got {got:?}")]
    HeaderMismatch { expected: &'static str, got: String },
    #[error("malformed version line: {0:?}")]
    MalformedVersion(String),
    #[error("made with a newer incompatible version {0}.{1}")]
    FutureMajorVersion(u32, u32),
    #[error("reserved field is used; this version cannot read it")]
    ReservedFieldUsed,
    #[error("page document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("deflate failed: {0}")]
    Deflate(std::io::Error),
}

/// A decoded page document plus an optional non-fatal warning.
#[derive(Debug)]
pub struct DecodedPage {
    pub document: serde_json::Value,
    pub warning: Option<String>,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Serialize a page document into a clipboard share string.
pub fn encode_page(document: &serde_json::Value) -> Result<String, ShareStringError> {
    let mut payload = Vec::new();
    payload.extend_from_slice(SHARE_MAGIC.as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(SHARE_KIND.as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(format!("{}.{}", SHARE_VERSION.0, SHARE_VERSION.1).as_bytes());
    payload.push(b'\n');
    payload.push(b'\n'); // reserved
    payload.push(b'\n'); // reserved 2, must stay empty
    serde_json::to_writer(&mut payload, document)?;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&payload)
        .map_err(ShareStringError::Deflate)?;
    let compressed = encoder.finish().map_err(ShareStringError::Deflate)?;
    Ok(BASE64.encode(compressed))
}

/// Parse a clipboard share string back into a page document.
pub fn decode_page(share: &str) -> Result<DecodedPage, ShareStringError> {
    let compressed = BASE64.decode(share.trim())?;
    let mut payload = Vec::new();
    DeflateDecoder::new(&compressed[..])
        .read_to_end(&mut payload)
        .map_err(ShareStringError::Inflate)?;

    let mut rest: &[u8] = &payload;
    let mut take_line = || -> Result<String, ShareStringError> {
        let pos = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| ShareStringError::HeaderMismatch {
                expected: SHARE_MAGIC,
                got: String::from_utf8_lossy(rest).into_owned(),
            })?;
        let line = String::from_utf8_lossy(&rest[..pos]).into_owned();
        rest = &rest[pos + 1..];
        Ok(line)
    };

    let magic = take_line()?;
    if magic != SHARE_MAGIC {
        return Err(ShareStringError::HeaderMismatch {
            expected: SHARE_MAGIC,
            got: magic,
        });
    }
    let kind = take_line()?;
    if kind != SHARE_KIND {
        return Err(ShareStringError::HeaderMismatch {
            expected: SHARE_KIND,
            got: kind,
        });
    }
    let version_line = take_line()?;
    let version = parse_version(&version_line)
        .ok_or_else(|| ShareStringError::MalformedVersion(version_line.clone()))?;
    if version.0 > SHARE_VERSION.0 {
        return Err(ShareStringError::FutureMajorVersion(version.0, version.1));
    }
    let _reserved = take_line()?;
    let reserved2 = take_line()?;
    if !reserved2.is_empty() {
        return Err(ShareStringError::ReservedFieldUsed);
    }

    let warning = (version > SHARE_VERSION).then(|| {
        format!(
            "page was made with a newer version ({}.{}); some data may be ignored",
            version.0, version.1
        )
    });

    let document = serde_json::from_slice(rest)?;
    Ok(DecodedPage { document, warning })
}

fn parse_version(line: &str) -> Option<(u32, u32)> {
    let (major, minor) = line.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

// ---------------------------------------------------------------------------
// Page document construction
// ---------------------------------------------------------------------------

/// Build a structural JSON document for a page, by name so documents
/// survive catalog id reassignment across mod-pack updates.
pub fn page_document(arena: &PlanArena, catalog: &Catalog, table: TableKey) -> serde_json::Value {
    let t = &arena.tables[table];
    let links: Vec<serde_json::Value> = t
        .links
        .iter()
        .map(|&key| {
            let link = &arena.links[key];
            serde_json::json!({
                "goods": catalog.goods(link.goods).name,
                "amount": link.amount,
                "algorithm": match link.algorithm {
                    LinkAlgorithm::Match => "match",
                    LinkAlgorithm::AllowOverProduction => "over-production",
                    LinkAlgorithm::AllowOverConsumption => "over-consumption",
                },
            })
        })
        .collect();
    let rows: Vec<serde_json::Value> = t
        .rows
        .iter()
        .map(|&key| {
            let row = &arena.rows[key];
            let mut doc = serde_json::json!({
                "recipe": catalog.recipe(row.recipe).name,
                "crafter": catalog.entity(row.crafter).name,
                "enabled": row.enabled,
            });
            if let Some(fuel) = row.fuel {
                doc["fuel"] = catalog.goods(fuel).name.clone().into();
            }
            if row.fixed_buildings > 0.0 {
                doc["fixed_buildings"] = row.fixed_buildings.into();
            }
            if let Some(built) = row.built_buildings {
                doc["built_buildings"] = built.into();
            }
            if let Some(sub) = row.subgroup {
                doc["subgroup"] = page_document(arena, catalog, sub);
            }
            doc
        })
        .collect();
    serde_json::json!({ "links": links, "rows": rows })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> serde_json::Value {
        serde_json::json!({
            "links": [{"goods": "iron-plate", "amount": 1.0, "algorithm": "match"}],
            "rows": [{"recipe": "iron-plate", "crafter": "stone-furnace", "enabled": true}],
        })
    }

    #[test]
    fn round_trip() {
        let encoded = encode_page(&sample_doc()).unwrap();
        let decoded = decode_page(&encoded).unwrap();
        assert_eq!(decoded.document, sample_doc());
        assert!(decoded.warning.is_none());
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(matches!(
            decode_page("!!! not base64 !!!"),
            Err(ShareStringError::Base64(_))
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let payload = b"NOPE\nProjectPage\n1.0\n\n\n{}".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn rejects_wrong_kind() {
        let payload = b"YAFC\nSomethingElse\n1.0\n\n\n{}".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn rejects_future_major_version() {
        let payload = b"YAFC\nProjectPage\n2.0\n\n\n{}".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::FutureMajorVersion(2, 0))
        ));
    }

    #[test]
    fn warns_on_newer_minor_version() {
        let payload = b"YAFC\nProjectPage\n1.7\n\n\n{}".to_vec();
        let share = compress_and_encode(&payload);
        let decoded = decode_page(&share).unwrap();
        assert!(decoded.warning.is_some());
        assert_eq!(decoded.document, serde_json::json!({}));
    }

    #[test]
    fn rejects_used_reserved_field() {
        let payload = b"YAFC\nProjectPage\n1.0\n\nsurprise\n{}".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::ReservedFieldUsed)
        ));
    }

    #[test]
    fn rejects_malformed_version() {
        let payload = b"YAFC\nProjectPage\nbanana\n\n\n{}".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::MalformedVersion(_))
        ));
    }

    #[test]
    fn rejects_invalid_json_payload() {
        let payload = b"YAFC\nProjectPage\n1.0\n\n\nnot-json".to_vec();
        let share = compress_and_encode(&payload);
        assert!(matches!(
            decode_page(&share),
            Err(ShareStringError::Json(_))
        ));
    }

    fn compress_and_encode(payload: &[u8]) -> String {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        BASE64.encode(encoder.finish().unwrap())
    }
}
