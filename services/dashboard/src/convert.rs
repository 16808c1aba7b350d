//! Offline conversion of stored camera frames, used by `rgb565-convert`.

use crate::format::{classify, ImageFormat};
use crate::image_store::encode_jpeg;
use crate::resolution::{resolve_for_payload, Resolution};
use crate::rgb565::{decode_with_layout, PixelLayout};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix given to converted frames
pub const CONVERTED_SUFFIX: &str = "_converted";

/// Files smaller than this are not raw frames worth converting
pub const MIN_BATCH_FILE_BYTES: u64 = 10_000;

/// Result of converting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `None` when the input was already a JPEG
    pub resolution: Option<Resolution>,
    pub input_bytes: usize,
    pub output_bytes: usize,
}

/// Totals for a directory conversion
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Default output path: `<dir>/<stem>_converted.jpg`
pub fn default_output_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, CONVERTED_SUFFIX)
}

fn sibling_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.jpg", stem, suffix))
}

/// Convert one file to a displayable JPEG.
///
/// JPEG input is copied unchanged. Anything else is decoded as RGB565: `hint`
/// is used when it matches the file size, otherwise the size is resolved from
/// the known sensor resolutions.
pub fn convert_file(
    input: &Path,
    output: Option<&Path>,
    hint: Option<Resolution>,
    layout: PixelLayout,
) -> Result<Converted> {
    let payload =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));

    let format = classify(&payload);
    let (jpeg, resolution) = if format == ImageFormat::Jpeg {
        debug!(input = %input.display(), "Input is already JPEG");
        (payload.clone(), None)
    } else {
        if format == ImageFormat::Unknown {
            debug!(
                input = %input.display(),
                size_bytes = payload.len(),
                "Size matches no sensor resolution, relying on dimensions"
            );
        }
        let resolution = resolve_for_payload(payload.len(), hint, None)?;
        if let Some(hint) = hint.filter(|h| *h != resolution) {
            warn!(
                requested = %hint,
                detected = %resolution,
                "File size does not match requested dimensions"
            );
        }
        let image = decode_with_layout(&payload, resolution, layout)?;
        (encode_jpeg(&image)?, Some(resolution))
    };

    fs::write(&output, &jpeg)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        layout = %layout,
        "Frame converted"
    );

    Ok(Converted {
        input: input.to_path_buf(),
        output,
        resolution,
        input_bytes: payload.len(),
        output_bytes: jpeg.len(),
    })
}

/// Render a frame once per pixel layout, as `<stem>_<layout>.jpg`.
///
/// Used to calibrate a new sensor against a known reference image.
pub fn convert_all_layouts(input: &Path, hint: Option<Resolution>) -> Result<Vec<Converted>> {
    PixelLayout::ALL
        .iter()
        .map(|layout| {
            let output = sibling_with_suffix(input, &format!("_{}", layout.label()));
            convert_file(input, Some(&output), hint, *layout)
        })
        .collect()
}

/// Convert every raw frame in a directory.
///
/// Skips earlier conversions, JPEGs, and files under
/// [`MIN_BATCH_FILE_BYTES`]. One failure does not stop the batch.
pub fn convert_directory(dir: &Path, layout: PixelLayout) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if !should_convert(&path) {
            summary.skipped += 1;
            continue;
        }

        match convert_file(&path, None, None, layout) {
            Ok(_) => summary.converted += 1,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Conversion failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        "Batch conversion finished"
    );

    Ok(summary)
}

fn should_convert(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Unreadable entry skipped");
            return false;
        }
    };
    if !metadata.is_file() || metadata.len() < MIN_BATCH_FILE_BYTES {
        return false;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.ends_with(CONVERTED_SUFFIX)
        || PixelLayout::ALL
            .iter()
            .any(|l| stem.ends_with(&format!("_{}", l.label())))
    {
        return false;
    }

    let mut head = [0u8; 2];
    let is_jpeg = fs::File::open(path)
        .and_then(|mut f| std::io::Read::read_exact(&mut f, &mut head))
        .map(|_| classify(&head) == ImageFormat::Jpeg)
        .unwrap_or(false);

    !is_jpeg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/uploads/frame.rgb565")),
            PathBuf::from("/tmp/uploads/frame_converted.jpg")
        );
    }

    #[test]
    fn test_convert_with_explicit_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        // 10x5 is not a sensor size
        fs::write(&input, vec![0xFFu8; 10 * 5 * 2]).unwrap();

        let converted =
            convert_file(&input, None, Resolution::new(10, 5), PixelLayout::default()).unwrap();

        assert_eq!(converted.resolution, Resolution::new(10, 5));
        assert_eq!(converted.output, dir.path().join("frame_converted.jpg"));
        let jpeg = fs::read(&converted.output).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_convert_detects_size_when_hint_wrong() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        fs::write(&input, vec![0u8; 160 * 120 * 2]).unwrap();

        let converted =
            convert_file(&input, None, Resolution::new(800, 600), PixelLayout::default()).unwrap();
        assert_eq!(converted.resolution, Resolution::new(160, 120));
    }

    #[test]
    fn test_convert_unresolvable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        fs::write(&input, vec![0u8; 1000 * 2]).unwrap();

        let output = dir.path().join("out.jpg");
        assert!(convert_file(&input, Some(&output), None, PixelLayout::default()).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_jpeg_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        fs::write(&input, b"\xff\xd8\xff\xe0rest").unwrap();

        let converted = convert_file(&input, None, None, PixelLayout::default()).unwrap();
        assert!(converted.resolution.is_none());
        assert_eq!(fs::read(&converted.output).unwrap(), b"\xff\xd8\xff\xe0rest");
    }

    #[test]
    fn test_all_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frame.raw");
        fs::write(&input, vec![0xF8u8; 160 * 120 * 2]).unwrap();

        let outputs = convert_all_layouts(&input, None).unwrap();
        assert_eq!(outputs.len(), 4);
        for name in ["frame_big_rgb.jpg", "frame_big_bgr.jpg", "frame_little_rgb.jpg", "frame_little_bgr.jpg"] {
            assert!(dir.path().join(name).exists(), "{}", name);
        }
    }

    #[test]
    fn test_batch_skips_small_converted_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.raw"), vec![0u8; 160 * 120 * 2]).unwrap();
        fs::write(dir.path().join("tiny.raw"), vec![0u8; 200]).unwrap();
        let mut jpeg = vec![0u8; 20_000];
        jpeg[0] = 0xFF;
        jpeg[1] = 0xD8;
        fs::write(dir.path().join("photo.jpg"), jpeg).unwrap();
        // not a sensor size and no hint in batch mode
        fs::write(dir.path().join("odd.raw"), vec![0u8; 12_345 * 2]).unwrap();

        let summary = convert_directory(dir.path(), PixelLayout::default()).unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                converted: 1,
                skipped: 2,
                failed: 1,
            }
        );
        assert!(dir.path().join("a_converted.jpg").exists());

        // a second pass leaves the earlier output alone
        let again = convert_directory(dir.path(), PixelLayout::default()).unwrap();
        assert_eq!(again.skipped, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_batch_continues_past_dangling_link() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.raw"), dir.path().join("a.raw"))
            .unwrap();
        fs::write(dir.path().join("b.raw"), vec![0u8; 160 * 120 * 2]).unwrap();

        let summary = convert_directory(dir.path(), PixelLayout::default()).unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                converted: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert!(dir.path().join("b_converted.jpg").exists());
    }
}
