//! Lifecycle states and the handle shared by requests.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ClassifierError;
use crate::model::ForwardPass;
use crate::preprocess::PreprocessingPipeline;

/// Initialization state of the model runtime.
///
/// # State Transitions
///
/// ```text
/// Uninitialized ──init ok──► Ready
///       │                      │
///   init failed         runtime invalidated
///       ▼                      ▼
///    Failed ◄──────────────────┘
///       │
///   next request retries
///       ▼
///   Ready or Failed
/// ```
#[derive(Clone)]
pub enum InitializationState {
    Uninitialized,
    Ready(ModelRuntimeHandle),
    Failed(ClassifierError),
}

impl InitializationState {
    /// Lowercase name used in readiness reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn handle(&self) -> Option<&ModelRuntimeHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ClassifierError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for InitializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("Uninitialized"),
            Self::Ready(handle) => f.debug_tuple("Ready").field(handle).finish(),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Ready runtime plus the pipeline that feeds it.
///
/// Cheap to clone. A request holds its own clone, so a concurrent
/// invalidation never pulls the runtime out from under it.
#[derive(Clone)]
pub struct ModelRuntimeHandle {
    generation: u64,
    runtime: Arc<dyn ForwardPass>,
    pipeline: PreprocessingPipeline,
}

impl ModelRuntimeHandle {
    pub(crate) fn new(generation: u64, runtime: Arc<dyn ForwardPass>) -> Self {
        Self {
            generation,
            runtime,
            pipeline: PreprocessingPipeline::new(),
        }
    }

    /// Identifies the initialization attempt that produced this handle.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn runtime(&self) -> &dyn ForwardPass {
        self.runtime.as_ref()
    }

    #[must_use]
    pub fn pipeline(&self) -> &PreprocessingPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn device_label(&self) -> &str {
        self.runtime.device_label()
    }

    /// Both handles wrap the same runtime instance.
    #[must_use]
    pub fn same_runtime(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.runtime, &other.runtime)
    }
}

impl fmt::Debug for ModelRuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRuntimeHandle")
            .field("generation", &self.generation)
            .field("device", &self.device_label())
            .finish()
    }
}

/// Point-in-time view of the lifecycle, for readiness reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleSnapshot {
    /// `uninitialized`, `ready` or `failed`.
    pub state: &'static str,
    /// Generation of the ready handle, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Device of the ready handle, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Completed initialization attempts, successful or not.
    pub attempts: u64,
    /// Message of the memoized failure, if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_type: Option<&'static str>,
}

impl LifecycleSnapshot {
    pub(crate) fn capture(state: &InitializationState, attempts: u64) -> Self {
        Self {
            state: state.name(),
            generation: state.handle().map(ModelRuntimeHandle::generation),
            device: state.handle().map(|h| h.device_label().to_string()),
            attempts,
            last_error: state.error().map(ToString::to_string),
            last_error_type: state.error().map(ClassifierError::kind),
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == "ready"
    }
}
