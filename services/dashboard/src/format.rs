//! Payload format classification.
//!
//! The camera does not label its uploads, so the encoding is inferred from the
//! bytes alone: a JPEG start-of-image marker, or a raw RGB565 frame whose size
//! matches one of the sensor's output resolutions.

use std::fmt;

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Pixel counts the camera produces, in lookup order
pub const KNOWN_PIXEL_COUNTS: [usize; 4] = [
    800 * 600, // SVGA
    400 * 600, // SVGA half-width crop
    320 * 240, // QVGA
    160 * 120, // QQVGA
];

/// Encoding of an uploaded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    PackedRgb565,
    Unknown,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::PackedRgb565 => "rgb565",
            ImageFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a payload by its content.
pub fn classify(payload: &[u8]) -> ImageFormat {
    if is_jpeg(payload) {
        ImageFormat::Jpeg
    } else if is_known_rgb565(payload) {
        ImageFormat::PackedRgb565
    } else {
        ImageFormat::Unknown
    }
}

fn is_jpeg(payload: &[u8]) -> bool {
    payload.starts_with(&JPEG_SOI)
}

fn is_known_rgb565(payload: &[u8]) -> bool {
    if payload.len() % 2 != 0 {
        return false;
    }
    KNOWN_PIXEL_COUNTS.contains(&(payload.len() / 2))
}

/// Hex preview of the leading bytes, for rejection logs
pub fn header_hex(payload: &[u8]) -> String {
    if payload.len() < 10 {
        return "too short".to_string();
    }
    payload[..10].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_marker_only() {
        assert_eq!(classify(&[0xFF, 0xD8]), ImageFormat::Jpeg);
    }

    #[test]
    fn test_jpeg_wins_over_rgb565_size() {
        let mut payload = vec![0u8; 320 * 240 * 2];
        payload[0] = 0xFF;
        payload[1] = 0xD8;
        assert_eq!(classify(&payload), ImageFormat::Jpeg);
    }

    #[test]
    fn test_jpeg_with_odd_trailer() {
        assert_eq!(classify(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), ImageFormat::Jpeg);
    }

    #[test]
    fn test_known_rgb565_sizes() {
        for count in KNOWN_PIXEL_COUNTS {
            let payload = vec![0x12u8; count * 2];
            assert_eq!(classify(&payload), ImageFormat::PackedRgb565, "count {}", count);
        }
    }

    #[test]
    fn test_unknown_sizes() {
        assert_eq!(classify(&[]), ImageFormat::Unknown);
        assert_eq!(classify(&[0xFF]), ImageFormat::Unknown);
        assert_eq!(classify(&[0xD8, 0xFF]), ImageFormat::Unknown);
        // one byte short of QQVGA
        assert_eq!(classify(&vec![0u8; 160 * 120 * 2 - 1]), ImageFormat::Unknown);
        // even, but not a sensor resolution
        assert_eq!(classify(&vec![0u8; 100 * 100 * 2]), ImageFormat::Unknown);
    }

    #[test]
    fn test_header_hex() {
        assert_eq!(header_hex(&[1, 2, 3]), "too short");
        assert_eq!(
            header_hex(&[0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5, 6]),
            "deadbeef000102030405"
        );
    }
}
