use crate::error::DecodeError;
use std::fmt;
use tracing::debug;

/// Sensor output sizes, most common first. Order breaks ties between
/// transposed shapes with the same pixel count.
pub const CANDIDATE_RESOLUTIONS: [(u32, u32); 8] = [
    (800, 600),
    (600, 800),
    (400, 600),
    (600, 400),
    (320, 240),
    (240, 320),
    (160, 120),
    (120, 160),
];

/// Pixel dimensions of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Returns `None` if either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of an RGB565 frame of this size
    pub fn packed_len(&self) -> usize {
        self.pixel_count() * 2
    }

    /// Byte length of an RGB888 frame of this size
    pub fn rgb888_len(&self) -> usize {
        self.pixel_count() * 3
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Recover a frame shape from its pixel count.
///
/// Tries the candidate table in order, then a square frame. Anything else is
/// `DimensionUnresolved`; no other shape is ever guessed.
pub fn resolve(pixel_count: usize) -> Result<Resolution, DecodeError> {
    let candidate = CANDIDATE_RESOLUTIONS
        .iter()
        .find(|(w, h)| (*w as usize) * (*h as usize) == pixel_count);

    if let Some(&(width, height)) = candidate {
        return Ok(Resolution { width, height });
    }

    if let Some(side) = exact_square_root(pixel_count) {
        if let Some(res) = u32::try_from(side).ok().and_then(|s| Resolution::new(s, s)) {
            return Ok(res);
        }
    }

    Err(DecodeError::DimensionUnresolved { pixel_count })
}

/// Pick the shape for an RGB565 payload of `byte_len` bytes.
///
/// An out-of-band hint wins when it agrees with the payload length. Otherwise
/// the pixel count is resolved, and `fallback` (if configured) is used when
/// that fails. The fallback is not checked here; decoding enforces the length.
pub fn resolve_for_payload(
    byte_len: usize,
    hint: Option<Resolution>,
    fallback: Option<Resolution>,
) -> Result<Resolution, DecodeError> {
    if byte_len % 2 != 0 {
        return Err(DecodeError::LengthMismatch {
            expected: byte_len + 1,
            actual: byte_len,
        });
    }

    if let Some(hint) = hint {
        if hint.packed_len() == byte_len {
            return Ok(hint);
        }
        debug!(
            hint = %hint,
            expected_bytes = hint.packed_len(),
            actual_bytes = byte_len,
            "Dimension hint disagrees with payload length, resolving from size"
        );
    }

    match resolve(byte_len / 2) {
        Ok(res) => Ok(res),
        Err(err) => match fallback {
            Some(res) => {
                debug!(fallback = %res, "Using configured fallback resolution");
                Ok(res)
            }
            None => Err(err),
        },
    }
}

fn exact_square_root(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let mut side = (n as f64).sqrt() as usize;
    // float sqrt can be off by one for large inputs
    while side * side > n {
        side -= 1;
    }
    while (side + 1) * (side + 1) <= n {
        side += 1;
    }
    (side * side == n).then_some(side)
}
