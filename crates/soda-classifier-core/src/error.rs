//! Error taxonomy for the classification pipeline.
//!
//! # Error Categories
//!
//! | Kind | Variants | Scope |
//! |------|----------|-------|
//! | Input | `Decode`, `Shape` | Single request, shared state untouched |
//! | Initialization | `WeightsNotFound`, `WeightsLoad`, `DeviceInit` | Lifecycle goes to Failed, retried on next call |
//! | Execution | `RuntimeExecution` | Single request, may demote the runtime |
//! | Configuration | `InvalidConfig` | Startup |
//! | Internal | `Internal` | Caught at the request boundary |
//!
//! Every variant is `Clone`: a failed initialization is memoized in the
//! lifecycle state and handed to every caller that observed that attempt.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for every core operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    /// Payload is not a decodable image.
    #[error("Failed to decode image: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },

    /// Decoded image or tensor has an unusable shape.
    #[error("Invalid image shape: {reason}")]
    Shape {
        /// Description of the offending shape.
        reason: String,
    },

    /// Weights artifact is absent at the configured path.
    #[error("Weights file not found at {path:?}")]
    WeightsNotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// Weights artifact exists but could not be parsed or bound.
    #[error("Failed to load weights from {path:?}: {reason}")]
    WeightsLoad {
        /// The artifact path.
        path: PathBuf,
        /// Parse, checksum or binding failure.
        reason: String,
    },

    /// Compute device could not be created.
    #[error("Device initialization failed: {reason}")]
    DeviceInit {
        /// Backend error message.
        reason: String,
    },

    /// Forward evaluation failed.
    #[error("Forward pass failed on {device}: {reason}")]
    RuntimeExecution {
        /// Device label (`cpu`, `cuda`, `metal`).
        device: String,
        /// Backend error message.
        reason: String,
        /// Whether the runtime handle must be discarded.
        handle_unusable: bool,
    },

    /// Configuration value rejected by validation.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Dotted config key.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Unexpected failure (panic, broken invariant).
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic message. Not shown to clients.
        message: String,
    },
}

impl ClassifierError {
    /// Taxonomy name, used as the `type` field of error responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "DecodeError",
            Self::Shape { .. } => "ShapeError",
            Self::WeightsNotFound { .. } => "WeightsNotFoundError",
            Self::WeightsLoad { .. } => "WeightsLoadError",
            Self::DeviceInit { .. } => "DeviceInitError",
            Self::RuntimeExecution { .. } => "RuntimeExecutionError",
            Self::InvalidConfig { .. } => "ConfigError",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// Stable structured code for logging (e.g. "ERR-CLS-DECODE").
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "ERR-CLS-DECODE",
            Self::Shape { .. } => "ERR-CLS-SHAPE",
            Self::WeightsNotFound { .. } => "ERR-CLS-WEIGHTS-MISSING",
            Self::WeightsLoad { .. } => "ERR-CLS-WEIGHTS-LOAD",
            Self::DeviceInit { .. } => "ERR-CLS-DEVICE-INIT",
            Self::RuntimeExecution { .. } => "ERR-CLS-RUNTIME-EXEC",
            Self::InvalidConfig { .. } => "ERR-CLS-CONFIG-INVALID",
            Self::Internal { .. } => "ERR-CLS-INTERNAL",
        }
    }

    /// Caused by the request payload rather than the service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Shape { .. })
    }

    /// Produced by a lifecycle initialization attempt.
    #[must_use]
    pub fn is_initialization_error(&self) -> bool {
        matches!(
            self,
            Self::WeightsNotFound { .. } | Self::WeightsLoad { .. } | Self::DeviceInit { .. }
        )
    }

    /// The runtime that produced this error must not serve further requests.
    #[must_use]
    pub fn invalidates_runtime(&self) -> bool {
        matches!(
            self,
            Self::RuntimeExecution {
                handle_unusable: true,
                ..
            }
        )
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::Shape {
            reason: reason.into(),
        }
    }

    pub(crate) fn weights_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WeightsLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type ClassifierResult<T> = Result<T, ClassifierError>;
