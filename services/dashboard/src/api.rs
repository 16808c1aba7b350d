use crate::config::ApiConfig;
use crate::error::IngestError;
use crate::event_store::IngestionEvent;
use crate::image_store::{content_type_for, StorageError};
use crate::ingest::Ingestor;
use crate::realtime::ws_handler;
use crate::resolution::Resolution;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub service_name: String,
}

/// Optional out-of-band frame size sent by the device
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl UploadQuery {
    fn hint(&self) -> Option<Resolution> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Resolution::new(w, h),
            _ => None,
        }
    }
}

/// History listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct EventListResponse {
    pub events: Vec<IngestionEvent>,
    pub total_count: usize,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload))
        .route("/uploads/:name", get(serve_upload))
        .route("/api/v1/events", get(list_events))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.ingestor.store();
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
        "events": store.len(),
        "viewers": store.subscriber_count(),
    }))
}

/// Receive an image from the camera
#[instrument(skip(state, body), fields(size_bytes = body.len()))]
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, IngestError> {
    state.ingestor.ingest(body, query.hint()).await?;
    Ok((StatusCode::OK, "Upload success"))
}

/// Serve a stored image with an explicit content type
#[instrument(skip(state))]
async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let data = state.ingestor.sink().get(&name).await.map_err(|e| match e {
        StorageError::InvalidName(_) | StorageError::NotFound(_) => {
            (StatusCode::NOT_FOUND, "Not found".to_string())
        }
        other => {
            error!(error = %other, name = %name, "Failed to read image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read image".to_string(),
            )
        }
    })?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&name))], data))
}

/// Full event history
async fn list_events(State(state): State<AppState>) -> Json<EventListResponse> {
    let events = state.ingestor.store().snapshot();
    Json(EventListResponse {
        total_count: events.len(),
        events,
    })
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting dashboard API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
