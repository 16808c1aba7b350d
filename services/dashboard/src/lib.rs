//! Posture Dashboard
//!
//! Ingest service for the posture monitor camera. The camera posts a photo
//! whenever it detects the wearer leaning too close to the screen; this service
//! stores the photo, records a warning event and pushes it to every open
//! dashboard in real time.
//!
//! ## Upload formats
//!
//! - **JPEG**: stored as received.
//! - **RGB565**: raw sensor frames, recognised by size alone, decoded to RGB888
//!   and re-encoded as JPEG before storage.
//!
//! ## Architecture
//!
//! ```text
//!  Camera                                                      Dashboards
//! ┌────────┐  POST /upload  ┌──────────┐    ┌──────────────┐   ┌──────────┐
//! │ ESP32  │───────────────▶│ Ingestor │───▶│ EventStore   │──▶│ /ws      │
//! └────────┘                └──────────┘    │  history     │   │ viewers  │
//!                                │          │  broadcaster │   └──────────┘
//!                                ▼          └──────────────┘
//!                         ┌──────────────┐
//!                         │ ImageStore   │◀── GET /uploads/{name}
//!                         └──────────────┘
//! ```

pub mod api;
pub mod broadcaster;
pub mod config;
pub mod convert;
pub mod error;
pub mod event_store;
pub mod format;
pub mod image_store;
pub mod ingest;
pub mod realtime;
pub mod resolution;
pub mod rgb565;
pub mod telemetry;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use error::{DecodeError, IngestError};
pub use event_store::{EventStore, IngestionEvent, Subscription};
pub use format::{classify, ImageFormat};
pub use image_store::{ImageSink, LocalImageStore, StorageError};
pub use ingest::{IngestSettings, Ingestor};
pub use resolution::{resolve, Resolution};
pub use rgb565::{decode, decode_with_layout, DecodedImage, PixelLayout};
