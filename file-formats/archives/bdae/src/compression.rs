//! Decompression adapter for archive entries
//!
//! BDAE containers only ever use two of the ZIP compression methods: stored
//! (0) and deflate (8). Deflated entries carry a raw stream with no zlib
//! header and are inflated in a single shot.

use crate::{Error, Result};
use flate2::{Decompress, FlushDecompress, Status};

/// Compression methods supported by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Method 0: bytes stored verbatim
    Stored,
    /// Method 8: raw deflate stream
    Deflate,
}

impl CompressionMethod {
    /// Create from the raw method field of a local file header
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(CompressionMethod::Stored),
            8 => Some(CompressionMethod::Deflate),
            _ => None,
        }
    }
}

/// Decompress one entry's data
///
/// `uncompressed_size` is the size recorded in the entry's header and bounds
/// the output allocation.
pub fn decompress(method: u16, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    match CompressionMethod::from_raw(method) {
        Some(CompressionMethod::Stored) => Ok(data.to_vec()),
        Some(CompressionMethod::Deflate) => inflate_raw(data, uncompressed_size),
        None => Err(Error::UnsupportedCompression(method)),
    }
}

/// Inflate a raw (headerless) deflate stream in one shot
fn inflate_raw(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity(expected_size);

    match inflater.decompress_vec(data, &mut out, FlushDecompress::Finish) {
        Ok(Status::StreamEnd) => {}
        // some writers omit the final block marker; accept if the declared
        // size was fully produced
        Ok(_) if out.len() == expected_size => {}
        Ok(status) => {
            return Err(Error::decompression(format!(
                "deflate stream ended early ({status:?}): {} of {} bytes",
                out.len(),
                expected_size
            )));
        }
        Err(e) => return Err(Error::decompression(format!("inflate failed: {e}"))),
    }

    if out.len() != expected_size {
        log::debug!(
            "decompressed size mismatch: expected {}, got {}",
            expected_size,
            out.len()
        );
    }

    Ok(out)
}
