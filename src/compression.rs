//! Content compression
//!
//! Files written with compression enabled are stored as a zlib stream
//! (DEFLATE with zlib framing) and recorded with
//! [`CompressionKind::Deflate`](crate::record::CompressionKind). Reads
//! decompress into a buffer of exactly the recorded decompressed size.

use crate::error::{PackageError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compression configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    /// zlib level, 0 (store) to 9 (best)
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig { level: 6 }
    }
}

impl CompressionConfig {
    pub fn fast() -> Self {
        CompressionConfig { level: 1 }
    }

    pub fn best() -> Self {
        CompressionConfig { level: 9 }
    }

    fn compression(&self) -> Compression {
        Compression::new(self.level.min(9))
    }
}

const PREALLOCATE_LIMIT: usize = 16 * 1024 * 1024;

/// Worst-case compressed size for `len` input bytes (zlib's `compressBound`)
pub fn compress_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// Compress `data` into a buffer sized to the worst-case bound
pub fn compress(data: &[u8], config: &CompressionConfig) -> Result<Vec<u8>> {
    let buffer = Vec::with_capacity(compress_bound(data.len()));
    let mut encoder = ZlibEncoder::new(buffer, config.compression());
    encoder
        .write_all(data)
        .map_err(|e| PackageError::Codec(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| PackageError::Codec(format!("compression failed: {e}")))
}

/// Decompress `data`, which must expand to exactly `expected_len` bytes
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    // The recorded size is untrusted; cap the up-front allocation
    let mut decompressed = Vec::with_capacity(expected_len.min(PREALLOCATE_LIMIT));

    // One byte of slack so an oversized stream is detected rather than cut off
    let mut decoder = ZlibDecoder::new(data).take(expected_len as u64 + 1);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| PackageError::Codec(format!("decompression failed: {e}")))?;

    if decompressed.len() != expected_len {
        return Err(PackageError::Codec(format!(
            "decompressed {} bytes, expected {}",
            decompressed.len(),
            expected_len
        )));
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = b"Hello, World! ".repeat(100);
        let compressed = compress(&data, &CompressionConfig::default()).unwrap();
        assert!(compressed.len() < data.len());

        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_incompressible_data_stays_within_bound() {
        let data: Vec<u8> = (0..10_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let compressed = compress(&data, &CompressionConfig::best()).unwrap();
        assert!(compressed.len() <= compress_bound(data.len()));
    }

    #[test]
    fn test_empty_input() {
        let compressed = compress(&[], &CompressionConfig::default()).unwrap();
        assert!(!compressed.is_empty());
        assert!(decompress(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_length_mismatch() {
        let data = vec![0x42u8; 1000];
        let compressed = compress(&data, &CompressionConfig::fast()).unwrap();

        assert!(matches!(
            decompress(&compressed, 999),
            Err(PackageError::Codec(_))
        ));
        assert!(matches!(
            decompress(&compressed, 1001),
            Err(PackageError::Codec(_))
        ));
    }

    #[test]
    fn test_garbage_input() {
        assert!(matches!(
            decompress(b"definitely not zlib", 10),
            Err(PackageError::Codec(_))
        ));
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(CompressionConfig::default().level, 6);
        assert_eq!(CompressionConfig::fast().level, 1);
        assert_eq!(CompressionConfig::best().level, 9);
    }
}
