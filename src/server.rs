//! HTTP server for on-demand classification and reading ingest.
//!
//! This module provides an HTTP server that:
//! - Classifies leaf images and manual soil entries via POST /receive_data
//! - Feeds hardware readings into the change monitor via POST /readings
//!
//! # Architecture
//!
//! ```text
//! Mobile app ──→ POST /receive_data ──→ [Models] ──→ JSON response
//!                                          ↑
//!                                   latest reading
//!                                          │
//! Hardware bridge ──→ POST /readings ──→ monitor ──→ store
//! ```

use crate::core::reading::Reading;
use crate::model::Models;
use crate::source::ReadingSender;
use crate::store::RecommendationStore;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<&crate::config::ServerSettings> for ServerConfig {
    fn from(settings: &crate::config::ServerSettings) -> Self {
        Self::new(settings.host.clone(), settings.port)
    }
}

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<Models>,
    pub store: Arc<dyn RecommendationStore>,
    /// Present when the monitor is fed over HTTP
    pub readings: Option<ReadingSender>,
}

impl AppState {
    pub fn new(models: Arc<Models>, store: Arc<dyn RecommendationStore>) -> Self {
        Self {
            models,
            store,
            readings: None,
        }
    }

    pub fn with_readings(mut self, sender: ReadingSender) -> Self {
        self.readings = Some(sender);
        self
    }
}

/// Body of POST /readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRequest {
    pub reading: Vec<Value>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(error: impl std::fmt::Display) -> ApiError {
    tracing::error!("Request failed: {}", error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            message: "Internal server error".to_string(),
            error: error.to_string(),
        }),
    )
}

fn message(value: impl Serialize) -> Json<Value> {
    Json(json!({ "message": value }))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// JSON truthiness: null, false, 0, "" and empty containers are unset.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Image URLs from `image_url`, which may be one string or a list.
fn image_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// POST /receive_data
///
/// Dispatches on the first key that is set: `image_url`, `manualentryarray`,
/// then `hardwarebuffer`. Empty values fall through to the next key.
async fn receive_data(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if let Some(value) = body.get("image_url").filter(|v| is_set(v)) {
        let urls = image_urls(value);
        if urls.is_empty() {
            return Ok(message("File was not Uploaded"));
        }
        let predictions = state
            .models
            .classify_image_urls(&urls)
            .await
            .map_err(internal_error)?;
        if predictions.is_empty() {
            return Ok(message("File was not Uploaded"));
        }
        return Ok(message(predictions));
    }

    if let Some(value) = body.get("manualentryarray").filter(|v| is_set(v)) {
        let items = value
            .as_array()
            .ok_or_else(|| internal_error("manualentryarray must be an array"))?;
        let reading = Reading::from_json_values(items).map_err(internal_error)?;
        let prediction = state
            .models
            .classify_crop(&reading)
            .map_err(internal_error)?;
        return Ok(message(prediction));
    }

    if body.get("hardwarebuffer").and_then(Value::as_bool) == Some(true) {
        let latest = state.store.latest_reading().await.map_err(internal_error)?;
        let Some(latest) = latest else {
            return Ok(message("No hardware readings stored"));
        };
        let reading = latest.reading().map_err(internal_error)?;
        let prediction = state
            .models
            .classify_crop(&reading)
            .map_err(internal_error)?;
        return Ok(message(prediction));
    }

    Ok(message("Invalid request"))
}

/// POST /readings
///
/// Hands one reading to the change monitor.
async fn post_reading(
    State(state): State<AppState>,
    Json(body): Json<ReadingRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let reading = Reading::from_json_values(&body.reading).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                message: "Malformed reading".to_string(),
                error: e.to_string(),
            }),
        )
    })?;

    let unavailable = |error: String| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                message: "Monitor unavailable".to_string(),
                error,
            }),
        )
    };

    let sender = state
        .readings
        .as_ref()
        .ok_or_else(|| unavailable("monitor is not fed over HTTP".to_string()))?;
    sender
        .send(reading)
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    Ok((StatusCode::ACCEPTED, message("Reading accepted")))
}

/// Build the router without binding.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/receive_data", post(receive_data))
        .route("/readings", post(post_reading))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: AppState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Annadata server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_urls_accepts_string_or_list() {
        assert_eq!(image_urls(&json!("http://x/leaf.jpg")), vec!["http://x/leaf.jpg"]);
        assert_eq!(
            image_urls(&json!(["http://x/a.jpg", "", "http://x/b.jpg"])),
            vec!["http://x/a.jpg", "http://x/b.jpg"]
        );
        assert!(image_urls(&json!("  ")).is_empty());
        assert!(image_urls(&json!(null)).is_empty());
    }

    #[test]
    fn test_is_set_follows_truthiness() {
        assert!(!is_set(&json!("")));
        assert!(!is_set(&json!([])));
        assert!(!is_set(&json!(null)));
        assert!(!is_set(&json!(false)));
        assert!(!is_set(&json!(0)));
        assert!(is_set(&json!(" ")));
        assert!(is_set(&json!([1])));
    }
}
