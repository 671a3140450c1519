//! VGZ (gzip) decompression support
//!
//! VGM files travel gzip-compressed as `.vgz` more often than not. The
//! loader sniffs the magic and inflates transparently, so every other layer
//! works on plain files only.

use crate::{Result, VgmError};
use flate2::read::GzDecoder;
use std::io::Read;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Whether the buffer starts with a gzip stream.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 2 && data[0..2] == GZIP_MAGIC
}

/// Inflate gzip data, or pass plain data through unchanged.
pub fn decompress_if_needed(data: &[u8]) -> Result<Vec<u8>> {
    if !is_compressed(data) {
        return Ok(data.to_vec());
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| VgmError::Decompression(e.to_string()))?;
    log::debug!(
        "inflated {} compressed bytes into {}",
        data.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_plain_data_passes_through() {
        let data = b"Vgm \x00\x01\x02";
        assert!(!is_compressed(data));
        assert_eq!(decompress_if_needed(data).unwrap(), data.to_vec());
    }

    #[test]
    fn test_gzip_data_is_inflated() {
        let original = b"Vgm command data".to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert!(is_compressed(&compressed));
        assert_eq!(decompress_if_needed(&compressed).unwrap(), original);
    }

    #[test]
    fn test_corrupt_gzip_reports_error() {
        let bogus = [0x1F, 0x8B, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            decompress_if_needed(&bogus),
            Err(VgmError::Decompression(_))
        ));
    }
}
