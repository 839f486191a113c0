//! Error types for the HTTP surface.
//!
//! | Error | Status | `type` |
//! |-------|--------|--------|
//! | Malformed JSON, missing field, bad base64 | 400 | `InvalidRequest` |
//! | Body over `server.max_payload_size` | 413 | `PayloadTooLarge` |
//! | `DecodeError`, `ShapeError` | 400 | as named |
//! | `WeightsNotFoundError`, `WeightsLoadError`, `DeviceInitError` | 503 | as named |
//! | `RuntimeExecutionError` | 500 | as named |
//! | Anything else | 500 | `InternalError`, generic message |

use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use soda_classifier_core::ClassifierError;
use thiserror::Error;

/// Message returned for failures whose detail is not shown to clients.
pub const GENERIC_MESSAGE: &str = "internal server error";

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration file not found: {0:?}")]
    MissingFile(PathBuf),

    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error(transparent)]
    Invalid(#[from] ClassifierError),
}

/// Request-scoped failure, rendered as `{"error", "type"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request rejected before reaching the classifier.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// Detail is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Classifier(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Classifier(err) if err.is_initialization_error() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Classifier(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::PayloadTooLarge(_) => "PayloadTooLarge",
            Self::Classifier(err) if self.exposes_detail() => err.kind(),
            Self::Classifier(_) | Self::Internal(_) => "InternalError",
        }
    }

    /// Body sent to the client.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let error = if self.exposes_detail() {
            self.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        };
        ErrorBody {
            error,
            kind: self.kind().to_string(),
        }
    }

    fn exposes_detail(&self) -> bool {
        match self {
            Self::InvalidRequest(_) | Self::PayloadTooLarge(_) => true,
            Self::Classifier(err) => {
                err.is_client_error()
                    || err.is_initialization_error()
                    || matches!(err, ClassifierError::RuntimeExecution { .. })
            }
            Self::Internal(_) => false,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::InvalidRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = match &self {
            Self::Classifier(err) => err.error_code(),
            Self::InvalidRequest(_) => "ERR-HTTP-INVALID-REQUEST",
            Self::PayloadTooLarge(_) => "ERR-HTTP-PAYLOAD-TOO-LARGE",
            Self::Internal(_) => "ERR-HTTP-INTERNAL",
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error_code = code, error = %self, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error_code = code, error = %self, "Request rejected");
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let decode = ApiError::from(ClassifierError::Decode {
            reason: "bad".into(),
        });
        assert_eq!(decode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(decode.kind(), "DecodeError");

        let missing = ApiError::from(ClassifierError::WeightsNotFound {
            path: PathBuf::from("w.pth"),
        });
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(missing.kind(), "WeightsNotFoundError");

        let exec = ApiError::from(ClassifierError::RuntimeExecution {
            device: "cpu".into(),
            reason: "oom".into(),
            handle_unusable: false,
        });
        assert_eq!(exec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(exec.kind(), "RuntimeExecutionError");

        assert_eq!(
            ApiError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = ApiError::from(ClassifierError::Internal {
            message: "loader panicked at src/secret.rs:12".into(),
        });
        let body = err.body();
        assert_eq!(body.error, GENERIC_MESSAGE);
        assert_eq!(body.kind, "InternalError");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let join = ApiError::Internal("task panicked".into()).body();
        assert_eq!(join.error, GENERIC_MESSAGE);
    }

    #[test]
    fn test_body_serializes_type_field() {
        let json = serde_json::to_value(ApiError::InvalidRequest("missing field".into()).body())
            .unwrap();
        assert_eq!(json["type"], "InvalidRequest");
        assert_eq!(json["error"], "missing field");
    }
}
