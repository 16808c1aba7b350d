use crate::rgb565::DecodedImage;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// JPEG quality for converted frames
pub const JPEG_QUALITY: u8 = 95;

/// URL prefix under which stored images are served
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid image name: {0}")]
    InvalidName(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Where accepted images are written and read back from
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Store `data` under `name`, replacing nothing that already exists.
    async fn put(&self, name: &str, data: Bytes) -> Result<(), StorageError>;

    /// Read a previously stored image.
    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;
}

/// Image storage in a local directory
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    /// Open the upload directory, creating it if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        info!(upload_dir = %root.display(), "Image store initialized");

        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ImageSink for LocalImageStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(name)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &data).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        debug!(path = %path.display(), "Image written");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Generate a unique, time-sortable file name.
///
/// Format: `{YYYYmmdd_HHMMSS_mmm}_{8 hex}.{ext}`
pub fn generate_name(timestamp: &DateTime<Utc>, extension: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{timestamp}_{id}.{ext}",
        timestamp = timestamp.format("%Y%m%d_%H%M%S_%3f"),
        id = &id[..8],
        ext = extension
    )
}

/// URL path the dashboard uses for a stored image
pub fn image_url(name: &str) -> String {
    format!("{}/{}", UPLOADS_ROUTE, name)
}

/// Reject names that could escape the upload directory
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
        && !name.contains("..");

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Content type for a stored file, from its extension
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "rgb565" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

/// Encode a decoded bitmap as JPEG.
pub fn encode_jpeg(image: &DecodedImage) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(image.as_bytes(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| StorageError::Encode(e.to_string()))?;
    Ok(out)
}
