//! Request handlers.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use soda_classifier_core::{HealthDescriptor, LifecycleSnapshot, PredictionResult};

use crate::error::ApiError;
use crate::router::AppState;

/// `POST /predict` body.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Base64 image, optionally as a `data:<mime>;base64,` URL.
    pub image: String,
}

/// `POST /predict` success body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    /// Predicted class index.
    pub prediction: usize,
    pub confidence: f32,
    pub probabilities: [f32; 2],
    pub classes: [String; 2],
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.predicted_class_index,
            confidence: result.confidence,
            probabilities: result.class_probabilities,
            classes: result.class_labels,
        }
    }
}

/// `GET /`
pub async fn health(State(state): State<AppState>) -> Json<HealthDescriptor> {
    Json(state.service.health())
}

/// `GET /ready`
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<LifecycleSnapshot>) {
    let snapshot = state.service.readiness();
    let status = if snapshot.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot))
}

/// `POST /predict`
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    let bytes = decode_image_field(&request.image)?;

    let start = Instant::now();
    let payload_bytes = bytes.len();
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.predict(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("inference task failed: {e}")))??;

    tracing::info!(
        prediction = result.predicted_class_index,
        label = result.label(),
        confidence = result.confidence,
        payload_bytes,
        duration_ms = start.elapsed().as_millis() as u64,
        "Prediction served"
    );

    Ok(Json(result.into()))
}

/// Strip an optional data-URL header and decode standard base64.
pub fn decode_image_field(field: &str) -> Result<Vec<u8>, ApiError> {
    let field = field.trim();
    let encoded = match field.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| ApiError::InvalidRequest("malformed data URL in 'image'".into()))?,
        None => field,
    };

    STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::InvalidRequest(format!("'image' is not valid base64: {e}")))
}
