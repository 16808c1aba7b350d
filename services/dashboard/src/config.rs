use crate::resolution::Resolution;
use crate::rgb565::{ByteOrder, ChannelOrder, PixelLayout};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when a loaded configuration is unusable.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main configuration for the dashboard service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// RGB565 decoder configuration
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Expose Prometheus metrics
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// API configuration for the upload and dashboard endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Where uploaded images are written
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding persisted images
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Also keep the raw RGB565 payload next to the converted JPEG
    #[serde(default)]
    pub keep_raw: bool,
}

/// Decoder calibration. The defaults are the canonical layout.
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub channel_order: ChannelOrder,
    /// Used when a pixel count matches no known or square resolution
    #[serde(default)]
    pub fallback_width: Option<u32>,
    #[serde(default)]
    pub fallback_height: Option<u32>,
}

// Default value functions
fn default_service_name() -> String {
    "posture-dashboard".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5001
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    4 * 1024 * 1024 // 4MB, an 800x600 RGB565 frame is ~940KB
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config/dashboard")
    }

    /// Load with `base` as the local config file. A missing file leaves the
    /// defaults in place; a file that fails to parse is an error.
    pub fn load_from(base: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::with_name("/etc/posture/dashboard").required(false))
            // DASHBOARD__API__PORT -> api.port
            .add_source(
                config::Environment::with_prefix("DASHBOARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Check values that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.api.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.port".to_string(),
                message: "Port must be greater than 0".to_string(),
            });
        }

        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "Upload limit must be greater than 0".to_string(),
            });
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "storage.upload_dir".to_string(),
            ));
        }

        match (self.decoder.fallback_width, self.decoder.fallback_height) {
            (None, None) => {}
            (Some(w), Some(h)) if w > 0 && h > 0 => {}
            (Some(_), Some(_)) => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "decoder.fallback_width/height".to_string(),
                    message: "Dimensions must be greater than 0".to_string(),
                });
            }
            _ => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "decoder.fallback_width/height".to_string(),
                    message: "Both fallback dimensions must be set together".to_string(),
                });
            }
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigValidationError::InvalidValue {
                field: "logging.format".to_string(),
                message: format!("Unknown log format '{}'", other),
            }),
        }
    }

    /// Deployment-time decode layout
    pub fn pixel_layout(&self) -> PixelLayout {
        PixelLayout {
            byte_order: self.decoder.byte_order,
            channel_order: self.decoder.channel_order,
        }
    }

    /// Configured fallback resolution, if both dimensions are set
    pub fn fallback_resolution(&self) -> Option<Resolution> {
        match (self.decoder.fallback_width, self.decoder.fallback_height) {
            (Some(w), Some(h)) => Resolution::new(w, h),
            _ => None,
        }
    }

    /// Listen address for the HTTP server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            keep_raw: false,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::default(),
            channel_order: ChannelOrder::default(),
            fallback_width: None,
            fallback_height: None,
        }
    }
}
