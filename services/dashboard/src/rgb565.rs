//! RGB565 to RGB888 decoding.
//!
//! Each pixel is a 16-bit word holding 5 bits red, 6 bits green and 5 bits
//! blue from the most significant bit down. Fields are widened with
//! `v * 255 / max` using integer division, which is what the dashboard's
//! reference images were produced with. Bit replication gives different
//! values for mid-range inputs and must not be substituted.

use crate::error::DecodeError;
use crate::resolution::Resolution;
use serde::Deserialize;
use std::fmt;

const RED_MAX: u32 = 0x1F;
const GREEN_MAX: u32 = 0x3F;
const BLUE_MAX: u32 = 0x1F;

/// How the two bytes of a pixel word are ordered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Order of the three channels in the decoded bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Byte and channel ordering for one camera deployment.
///
/// `PixelLayout::default()` is the canonical layout (big-endian words, RGB
/// output). Other layouts only exist for calibrating a new sensor and are
/// chosen in configuration, never per upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelLayout {
    pub byte_order: ByteOrder,
    pub channel_order: ChannelOrder,
}

impl PixelLayout {
    /// Every layout, canonical first
    pub const ALL: [PixelLayout; 4] = [
        PixelLayout {
            byte_order: ByteOrder::BigEndian,
            channel_order: ChannelOrder::Rgb,
        },
        PixelLayout {
            byte_order: ByteOrder::BigEndian,
            channel_order: ChannelOrder::Bgr,
        },
        PixelLayout {
            byte_order: ByteOrder::LittleEndian,
            channel_order: ChannelOrder::Rgb,
        },
        PixelLayout {
            byte_order: ByteOrder::LittleEndian,
            channel_order: ChannelOrder::Bgr,
        },
    ];

    /// File-name friendly label, e.g. `big_rgb`
    pub fn label(&self) -> &'static str {
        match (self.byte_order, self.channel_order) {
            (ByteOrder::BigEndian, ChannelOrder::Rgb) => "big_rgb",
            (ByteOrder::BigEndian, ChannelOrder::Bgr) => "big_bgr",
            (ByteOrder::LittleEndian, ChannelOrder::Rgb) => "little_rgb",
            (ByteOrder::LittleEndian, ChannelOrder::Bgr) => "little_bgr",
        }
    }

    fn read_word(&self, pair: &[u8]) -> u16 {
        let bytes = [pair[0], pair[1]];
        match self.byte_order {
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An RGB888 bitmap. The buffer always holds exactly `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    resolution: Resolution,
    data: Vec<u8>,
}

impl DecodedImage {
    /// Wrap an existing buffer, checking its length.
    pub fn from_raw(resolution: Resolution, data: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = resolution.rgb888_len();
        if data.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { resolution, data })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Decode with the canonical layout.
pub fn decode(packed: &[u8], resolution: Resolution) -> Result<DecodedImage, DecodeError> {
    decode_with_layout(packed, resolution, PixelLayout::default())
}

/// Decode with an explicit deployment layout.
pub fn decode_with_layout(
    packed: &[u8],
    resolution: Resolution,
    layout: PixelLayout,
) -> Result<DecodedImage, DecodeError> {
    let expected = resolution.packed_len();
    if packed.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: packed.len(),
        });
    }

    let mut data = Vec::with_capacity(resolution.rgb888_len());
    for pair in packed.chunks_exact(2) {
        let [r, g, b] = expand(layout.read_word(pair));
        match layout.channel_order {
            ChannelOrder::Rgb => data.extend_from_slice(&[r, g, b]),
            ChannelOrder::Bgr => data.extend_from_slice(&[b, g, r]),
        }
    }

    DecodedImage::from_raw(resolution, data)
}

/// Split a pixel word into 8-bit red, green and blue.
pub fn expand(word: u16) -> [u8; 3] {
    let word = word as u32;
    let r5 = (word >> 11) & RED_MAX;
    let g6 = (word >> 5) & GREEN_MAX;
    let b5 = word & BLUE_MAX;
    [
        rescale(r5, RED_MAX),
        rescale(g6, GREEN_MAX),
        rescale(b5, BLUE_MAX),
    ]
}

#[inline]
fn rescale(value: u32, max: u32) -> u8 {
    (value * 255 / max) as u8
}
