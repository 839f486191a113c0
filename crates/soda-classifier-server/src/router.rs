//! Router construction.

use std::any::Any;

use axum::extract::DefaultBodyLimit;
use axum::http::{Response, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use soda_classifier_core::ClassifierService;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{ErrorBody, GENERIC_MESSAGE};
use crate::handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: ClassifierService,
}

impl AppState {
    pub fn new(service: ClassifierService) -> Self {
        Self { service }
    }
}

/// Build the application router.
///
/// Routes:
/// - `GET /` liveness descriptor
/// - `GET /ready` lifecycle snapshot, 503 until the model is loaded
/// - `POST /predict` classification
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/predict", post(handlers::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_payload_size))
        .layer(CatchPanicLayer::custom(panic_response));

    if config.cors_allow_any_origin {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        );
    }

    router
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<axum::body::Body> {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(error_code = "ERR-HTTP-PANIC", panic = %detail, "Handler panicked");

    let body = ErrorBody {
        error: GENERIC_MESSAGE.to_string(),
        kind: "InternalError".to_string(),
    };
    axum::response::IntoResponse::into_response((StatusCode::INTERNAL_SERVER_ERROR, Json(body)))
}
