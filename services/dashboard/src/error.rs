use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors from shape resolution and pixel decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Payload length {actual} does not match expected {expected} bytes")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Cannot determine dimensions for {pixel_count} pixels")]
    DimensionUnresolved { pixel_count: usize },
}

/// Reasons an upload is rejected.
///
/// Every variant is local to one request; none of them touch the event history.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Empty or truncated payload")]
    MalformedPayload,

    #[error("Unknown file format")]
    UnknownFormat,

    #[error("Cannot determine image dimensions for {pixel_count} pixels")]
    DimensionUnresolved { pixel_count: usize },

    #[error("RGB conversion failed: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Failed to store image: {0}")]
    PersistenceFailure(String),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedPayload => "malformed_payload",
            IngestError::UnknownFormat => "unknown_format",
            IngestError::DimensionUnresolved { .. } => "dimension_unresolved",
            IngestError::LengthMismatch { .. } => "length_mismatch",
            IngestError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<DecodeError> for IngestError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::LengthMismatch { expected, actual } => {
                IngestError::LengthMismatch { expected, actual }
            }
            DecodeError::DimensionUnresolved { pixel_count } => {
                IngestError::DimensionUnresolved { pixel_count }
            }
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
