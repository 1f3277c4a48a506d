//! Whole-stream compression for standalone object blobs.
//!
//! Blobs are plain zlib streams; there is no size prefix.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Refuse to inflate anything larger than this (a blob holds at most 4096 sprites).
const MAX_INFLATED_SIZE: u64 = 64 * 1024 * 1024;

/// Compress data using zlib.
///
/// `level` follows zlib: 0 stores, 9 is best.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if !is_compressed(data) {
        return Err(Error::invalid("blob is not a zlib stream"));
    }

    let mut decoder = ZlibDecoder::new(data).take(MAX_INFLATED_SIZE + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::invalid(format!("corrupt zlib stream: {}", e)))?;

    if out.len() as u64 > MAX_INFLATED_SIZE {
        return Err(Error::CapacityExceeded {
            what: "inflated blob size",
            limit: MAX_INFLATED_SIZE,
        });
    }
    Ok(out)
}

/// Check if data starts with a zlib header.
pub fn is_compressed(data: &[u8]) -> bool {
    if data.len() < 2 {
        return false;
    }
    let cmf = data[0];
    let flg = data[1];
    cmf & 0x0F == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"Sprite pixels repeat a lot. ".repeat(100);
        let compressed = compress(&original, 6).unwrap();
        assert!(compressed.len() < original.len());
        assert!(is_compressed(&compressed));
        assert_eq!(decompress(&compressed).unwrap(), original);
    }

    #[test]
    fn test_level_zero_still_round_trips() {
        let original = b"Short data";
        let stored = compress(original, 0).unwrap();
        assert_eq!(decompress(&stored).unwrap(), original);
    }

    #[test]
    fn test_rejects_plain_bytes() {
        assert!(!is_compressed(b"Not compressed data"));
        assert!(matches!(decompress(b"Not compressed data"), Err(Error::InvalidStructure(_))));
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let compressed = compress(&[7u8; 4096], 6).unwrap();
        let cut = &compressed[..compressed.len() / 2];
        assert!(decompress(cut).is_err());
    }
}
