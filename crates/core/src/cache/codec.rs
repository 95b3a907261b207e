//! Wire format for the remote backend.
//!
//! An entry is stored as JSON. Payloads at or above the compression threshold
//! are gzip-compressed; gzip output always begins with [`GZIP_MAGIC`], which is
//! never the first byte pair of a JSON object, so readers can tell the two apart
//! and values written before compression was enabled stay readable.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::Entry;
use crate::Error;

/// Leading bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Serialize an entry, compressing when the JSON is at least `threshold` bytes.
pub fn encode(entry: &Entry, threshold: Option<usize>) -> Result<Vec<u8>, Error> {
    let json = serde_json::to_vec(entry)?;
    match threshold {
        Some(limit) if json.len() >= limit => compress(&json),
        _ => Ok(json),
    }
}

/// Inverse of [`encode`]; accepts both compressed and plain payloads.
pub fn decode(payload: &[u8]) -> Result<Entry, Error> {
    if is_compressed(payload) {
        let json = decompress(payload)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(payload)?)
    }
}

pub fn is_compressed(payload: &[u8]) -> bool {
    payload.starts_with(&GZIP_MAGIC)
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Serialization(format!("gzip compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Serialization(format!("gzip compression failed: {e}")))
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Serialization(format!("gzip decompression failed: {e}")))?;
    Ok(out)
}
