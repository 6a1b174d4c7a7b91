//! Compressed guide/playlist payload handling
//!
//! Guide feeds are commonly served as `.gz` or `.xz`. Format is detected by
//! magic bytes, not file extension, since redirectors routinely lose the
//! suffix.

use std::io::Read;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::errors::{SourceError, SourceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Xz,
    Uncompressed,
}

/// Detect compression format from the payload's leading bytes.
pub fn detect_format(data: &[u8]) -> CompressionFormat {
    if data.len() >= 2 && data[0..2] == [0x1f, 0x8b] {
        CompressionFormat::Gzip
    } else if data.len() >= 6 && data[0..6] == [0xfd, b'7', b'z', b'X', b'Z', 0x00] {
        CompressionFormat::Xz
    } else {
        CompressionFormat::Uncompressed
    }
}

/// Decompress a payload if needed and decode it as UTF-8 (lossy).
pub fn decompress_to_string(data: &[u8]) -> SourceResult<String> {
    let bytes = match detect_format(data) {
        CompressionFormat::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| SourceError::parse("gzip", e.to_string()))?;
            out
        }
        CompressionFormat::Xz => {
            let mut decoder = XzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| SourceError::parse("xz", e.to_string()))?;
            out
        }
        CompressionFormat::Uncompressed => data.to_vec(),
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn detects_uncompressed() {
        assert_eq!(detect_format(b"<tv></tv>"), CompressionFormat::Uncompressed);
    }

    #[test]
    fn gzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<tv><channel id=\"X\"/></tv>").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(detect_format(&compressed), CompressionFormat::Gzip);
        let text = decompress_to_string(&compressed).unwrap();
        assert_eq!(text, "<tv><channel id=\"X\"/></tv>");
    }

    #[test]
    fn xz_magic_is_recognised() {
        let payload = [0xfd, b'7', b'z', b'X', b'Z', 0x00, 0x00];
        assert_eq!(detect_format(&payload), CompressionFormat::Xz);
    }

    #[test]
    fn truncated_gzip_is_an_error() {
        let payload = [0x1f, 0x8b, 0x00];
        assert!(decompress_to_string(&payload).is_err());
    }
}
