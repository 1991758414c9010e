//! zlib streams (RFC 1950) for IDAT data, backed by flate2.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Highest zlib compression level.
pub const MAX_LEVEL: u8 = 9;

/// Streaming zlib compressor.
///
/// Data can be fed in pieces (one filtered scanline at a time) so callers can
/// check a deadline between writes.
pub struct ZlibWriter {
    encoder: ZlibEncoder<Vec<u8>>,
}

impl ZlibWriter {
    /// Create a compressor at `level` (clamped to 0..=9), reserving `capacity` output bytes.
    pub fn new(level: u8, capacity: usize) -> Self {
        let level = level.min(MAX_LEVEL) as u32;
        Self {
            encoder: ZlibEncoder::new(Vec::with_capacity(capacity), Compression::new(level)),
        }
    }

    /// Feed more input.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.encoder
            .write_all(data)
            .map_err(|e| Error::Compression(format!("zlib write failed: {e}")))
    }

    /// Size of the compressed output produced so far.
    pub fn compressed_so_far(&self) -> usize {
        self.encoder.get_ref().len()
    }

    /// Finish the stream and return it.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.encoder
            .finish()
            .map_err(|e| Error::Compression(format!("zlib finish failed: {e}")))
    }
}

/// Compress `data` in one call.
pub fn compress(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut writer = ZlibWriter::new(level, data.len() / 2 + 64);
    writer.write(data)?;
    writer.finish()
}

/// Upper bound on deflate's expansion ratio.
const MAX_INFLATE_RATIO: usize = 1032;

/// Largest output buffer reserved before any data is inflated.
const MAX_PREALLOC: usize = 64 << 20;

/// Decompress a zlib stream that must yield exactly `expected` bytes.
///
/// Output beyond `expected` is never materialized: a stream that tries to
/// produce more is cut off there. The buffer grows with the data actually
/// inflated, so a huge `expected` with a short stream fails without reserving
/// `expected` bytes.
pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let reserve = expected
        .min(data.len().saturating_mul(MAX_INFLATE_RATIO))
        .min(MAX_PREALLOC);
    let mut out = Vec::with_capacity(reserve);
    let limit = (expected as u64).saturating_add(1);
    ZlibDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| Error::Format(format!("corrupt zlib stream: {e}")))?;

    if out.len() < expected {
        return Err(Error::Format(format!(
            "decompressed image data too short: {} < {}",
            out.len(),
            expected
        )));
    }
    if out.len() > expected {
        tracing::debug!(expected, "ignoring trailing decompressed bytes");
        out.truncate(expected);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_levels() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for level in 0..=MAX_LEVEL {
            let packed = compress(&data, level).unwrap();
            assert_eq!(decompress(&packed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = vec![7u8; 4096];
        let mut writer = ZlibWriter::new(6, 0);
        for piece in data.chunks(100) {
            writer.write(piece).unwrap();
        }
        let streamed = writer.finish().unwrap();
        assert_eq!(decompress(&streamed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_decompress_too_short() {
        let packed = compress(&[1, 2, 3], 6).unwrap();
        let err = decompress(&packed, 10).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_decompress_trailing_is_cut() {
        let packed = compress(&[1, 2, 3, 4, 5], 6).unwrap();
        assert_eq!(decompress(&packed, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_decompress_huge_expectation_fails_cleanly() {
        let packed = compress(&[1, 2, 3], 6).unwrap();
        let err = decompress(&packed, 1 << 50).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(decompress(&[0xde, 0xad, 0xbe, 0xef], 4).is_err());
    }
}
