//! Upload ingestion pipeline.
//!
//! ```text
//! payload -> classify -> [resolve -> decode -> encode JPEG] -> ImageSink -> EventStore
//! ```
//!
//! Nothing is appended to the history unless the image was stored.

use crate::error::IngestError;
use crate::event_store::{EventStore, IngestionEvent};
use crate::format::{classify, header_hex, ImageFormat};
use crate::image_store::{encode_jpeg, generate_name, image_url, ImageSink};
use crate::resolution::{resolve_for_payload, Resolution};
use crate::rgb565::{decode_with_layout, PixelLayout};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Extension of converted and pass-through images
const JPEG_EXTENSION: &str = "jpg";
/// Extension of raw frames kept alongside their conversion
const RAW_EXTENSION: &str = "rgb565";

/// Ingestion settings fixed at deployment time
#[derive(Debug, Clone, Default)]
pub struct IngestSettings {
    pub layout: PixelLayout,
    pub fallback_resolution: Option<Resolution>,
    pub keep_raw: bool,
}

/// Turns accepted uploads into stored images and history events
pub struct Ingestor {
    sink: Arc<dyn ImageSink>,
    store: Arc<EventStore>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(sink: Arc<dyn ImageSink>, store: Arc<EventStore>, settings: IngestSettings) -> Self {
        Self {
            sink,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn ImageSink> {
        &self.sink
    }

    /// Ingest one upload received now.
    pub async fn ingest(
        &self,
        payload: Bytes,
        hint: Option<Resolution>,
    ) -> Result<IngestionEvent, IngestError> {
        self.ingest_at(payload, hint, Utc::now()).await
    }

    /// Ingest one upload with an explicit arrival time.
    #[instrument(skip(self, payload), fields(size_bytes = payload.len()))]
    pub async fn ingest_at(
        &self,
        payload: Bytes,
        hint: Option<Resolution>,
        arrived_at: DateTime<Utc>,
    ) -> Result<IngestionEvent, IngestError> {
        let started = Instant::now();
        let result = self.process(payload, hint, arrived_at).await;

        match &result {
            Ok(event) => {
                metrics::counter!("dashboard.uploads.accepted").increment(1);
                metrics::histogram!("dashboard.ingest.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(image_url = %event.image_url, "New event recorded");
            }
            Err(e) => {
                metrics::counter!("dashboard.uploads.rejected", "reason" => e.kind()).increment(1);
            }
        }

        result
    }

    async fn process(
        &self,
        payload: Bytes,
        hint: Option<Resolution>,
        arrived_at: DateTime<Utc>,
    ) -> Result<IngestionEvent, IngestError> {
        if payload.is_empty() {
            warn!("Rejected empty upload");
            return Err(IngestError::MalformedPayload);
        }

        let format = classify(&payload);
        metrics::counter!("dashboard.bytes.received").increment(payload.len() as u64);

        let name = generate_name(&arrived_at, JPEG_EXTENSION);
        match format {
            ImageFormat::Jpeg => {
                info!(format = %format, "Valid JPEG received");
                self.persist(&name, payload).await?;
            }
            ImageFormat::PackedRgb565 => {
                let jpeg = self.convert(payload.clone(), hint).await?;
                self.persist(&name, Bytes::from(jpeg)).await?;
                // The raw copy is diagnostic only and never fails the upload
                if self.settings.keep_raw {
                    let raw_name = generate_name(&arrived_at, RAW_EXTENSION);
                    if let Err(e) = self.persist(&raw_name, payload).await {
                        warn!(error = %e, name = %raw_name, "Raw frame not kept");
                    }
                }
            }
            ImageFormat::Unknown => {
                warn!(
                    size_bytes = payload.len(),
                    header = %header_hex(&payload),
                    "Unknown file format"
                );
                return Err(IngestError::UnknownFormat);
            }
        }

        let event = IngestionEvent::new(arrived_at, image_url(&name));
        let viewers = self.store.append(event.clone());
        debug!(viewers, "Warning published");

        Ok(event)
    }

    /// Resolve, decode and JPEG-encode an RGB565 frame off the async workers.
    async fn convert(&self, payload: Bytes, hint: Option<Resolution>) -> Result<Vec<u8>, IngestError> {
        let resolution =
            resolve_for_payload(payload.len(), hint, self.settings.fallback_resolution)
                .map_err(|e| {
                    warn!(error = %e, size_bytes = payload.len(), "RGB565 dimensions unresolved");
                    IngestError::from(e)
                })?;
        let layout = self.settings.layout;

        info!(resolution = %resolution, layout = %layout, "Converting RGB565 frame");

        tokio::task::spawn_blocking(move || {
            let image = decode_with_layout(&payload, resolution, layout)?;
            encode_jpeg(&image).map_err(|e| IngestError::PersistenceFailure(e.to_string()))
        })
        .await
        .map_err(|e| {
            error!(error = %e, "RGB565 conversion task failed");
            IngestError::PersistenceFailure(e.to_string())
        })?
    }

    async fn persist(&self, name: &str, data: Bytes) -> Result<(), IngestError> {
        let size_bytes = data.len();
        self.sink.put(name, data).await.map_err(|e| {
            error!(error = %e, name = %name, "Failed to store image");
            IngestError::PersistenceFailure(e.to_string())
        })?;
        info!(name = %name, size_bytes, "Image saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_store::{LocalImageStore, StorageError};
    use async_trait::async_trait;

    struct FailingSink;

    #[async_trait]
    impl ImageSink for FailingSink {
        async fn put(&self, _name: &str, _data: Bytes) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound(name.to_string()))
        }
    }

    /// Local store that refuses names with the given extension
    struct RefusingSink {
        inner: LocalImageStore,
        extension: &'static str,
    }

    #[async_trait]
    impl ImageSink for RefusingSink {
        async fn put(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
            if name.ends_with(self.extension) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.put(name, data).await
        }

        async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.get(name).await
        }
    }

    async fn refusing_ingestor(dir: &std::path::Path, extension: &'static str) -> Ingestor {
        let sink = RefusingSink {
            inner: LocalImageStore::new(dir).await.unwrap(),
            extension,
        };
        let settings = IngestSettings {
            keep_raw: true,
            ..Default::default()
        };
        Ingestor::new(Arc::new(sink), Arc::new(EventStore::new()), settings)
    }

    fn stored_files(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn local_ingestor(dir: &std::path::Path, settings: IngestSettings) -> Ingestor {
        let sink = Arc::new(LocalImageStore::new(dir).await.unwrap());
        Ingestor::new(sink, Arc::new(EventStore::new()), settings)
    }

    fn name_of(event: &IngestionEvent) -> &str {
        event.image_url.trim_start_matches("/uploads/")
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = local_ingestor(dir.path(), IngestSettings::default()).await;

        let err = ingestor.ingest(Bytes::new(), None).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedPayload));
        assert!(ingestor.store().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = local_ingestor(dir.path(), IngestSettings::default()).await;

        let err = ingestor
            .ingest(Bytes::from_static(b"hello world"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownFormat));
        assert!(ingestor.store().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_jpeg_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = local_ingestor(dir.path(), IngestSettings::default()).await;
        let payload = Bytes::from_static(b"\xff\xd8\xff\xe0jpeg-body");

        let event = ingestor.ingest(payload.clone(), None).await.unwrap();

        assert!(event.image_url.starts_with("/uploads/"));
        assert!(event.image_url.ends_with(".jpg"));
        let stored = ingestor.sink().get(name_of(&event)).await.unwrap();
        assert_eq!(stored, payload.to_vec());
        assert_eq!(ingestor.store().snapshot(), vec![event]);
    }

    #[tokio::test]
    async fn test_svga_rgb565_converted_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = local_ingestor(dir.path(), IngestSettings::default()).await;
        let mut subscription = ingestor.store().subscribe();

        let payload = Bytes::from(vec![0x00u8; 800 * 600 * 2]);
        let event = ingestor.ingest(payload, None).await.unwrap();

        let stored = ingestor.sink().get(name_of(&event)).await.unwrap();
        assert_eq!(&stored[..2], &[0xFF, 0xD8]);
        assert_eq!(ingestor.store().len(), 1);
        assert!(subscription.replay.is_empty());
        assert_eq!(subscription.live.try_recv(), Some(event));
    }

    #[tokio::test]
    async fn test_keep_raw_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = IngestSettings {
            keep_raw: true,
            ..Default::default()
        };
        let ingestor = local_ingestor(dir.path(), settings).await;

        ingestor
            .ingest(Bytes::from(vec![0xFFu8; 160 * 120 * 2]), None)
            .await
            .unwrap();

        let mut extensions: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                path.extension().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        extensions.sort();
        assert_eq!(extensions, vec!["jpg", "rgb565"]);
    }

    #[tokio::test]
    async fn test_failed_jpeg_write_keeps_no_raw_frame() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = refusing_ingestor(dir.path(), ".jpg").await;

        let err = ingestor
            .ingest(Bytes::from(vec![0xFFu8; 160 * 120 * 2]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::PersistenceFailure(_)));
        assert!(ingestor.store().is_empty());
        assert!(stored_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_raw_write_still_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = refusing_ingestor(dir.path(), ".rgb565").await;

        let event = ingestor
            .ingest(Bytes::from(vec![0xFFu8; 160 * 120 * 2]), None)
            .await
            .unwrap();

        assert_eq!(ingestor.store().snapshot(), vec![event.clone()]);
        assert_eq!(stored_files(dir.path()), vec![name_of(&event).to_string()]);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_history_untouched() {
        let ingestor = Ingestor::new(
            Arc::new(FailingSink),
            Arc::new(EventStore::new()),
            IngestSettings::default(),
        );

        let err = ingestor
            .ingest(Bytes::from_static(b"\xff\xd8"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PersistenceFailure(_)));
        assert!(ingestor.store().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_is_arrival_time() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = local_ingestor(dir.path(), IngestSettings::default()).await;
        let arrived = "2024-01-15T10:30:45.5Z".parse::<DateTime<Utc>>().unwrap();

        let event = ingestor
            .ingest_at(Bytes::from_static(b"\xff\xd8"), None, arrived)
            .await
            .unwrap();
        assert_eq!(event.timestamp, arrived);
        assert!(name_of(&event).starts_with("20240115_103045_500_"));
    }
}
