//! Entry point used by transports.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{ClassLabels, ClassifierConfig};
use crate::engine::InferenceEngine;
use crate::error::ClassifierResult;
use crate::lifecycle::{LifecycleManager, LifecycleSnapshot, ResNetLoader, RuntimeLoader};
use crate::types::PredictionResult;

/// Fixed liveness message.
pub const HEALTH_STATUS: &str = "Soda Bottle Classifier API ready";

/// Model family reported by the health endpoint.
pub const MODEL_NAME: &str = "ResNet18";

/// Static liveness descriptor. Does not touch the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthDescriptor {
    pub status: &'static str,
    pub model: &'static str,
}

/// Classification service shared by all requests.
///
/// Cheap to clone; clones share one lifecycle.
#[derive(Debug, Clone)]
pub struct ClassifierService {
    lifecycle: Arc<LifecycleManager>,
    labels: ClassLabels,
}

impl ClassifierService {
    pub fn new(lifecycle: Arc<LifecycleManager>, labels: ClassLabels) -> Self {
        Self { lifecycle, labels }
    }

    /// Service backed by the ResNet-18 loader. Nothing is loaded yet.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn from_config(config: &ClassifierConfig) -> ClassifierResult<Self> {
        config.validate()?;
        let loader = ResNetLoader::from_config(config);
        Ok(Self::with_loader(loader, config.class_labels.clone()))
    }

    pub fn with_loader(loader: impl RuntimeLoader + 'static, labels: ClassLabels) -> Self {
        Self::new(Arc::new(LifecycleManager::new(loader)), labels)
    }

    /// Classify one encoded image, initializing the runtime on first use.
    ///
    /// A runtime error that leaves the runtime unusable demotes it, so the
    /// next request rebuilds it.
    pub fn predict(&self, raw: &[u8]) -> ClassifierResult<PredictionResult> {
        let handle = self.lifecycle.ensure_ready()?;
        let result = InferenceEngine::new(&handle, &self.labels).predict(raw);

        if let Err(err) = &result {
            if err.invalidates_runtime() {
                self.lifecycle.invalidate(&handle, err);
            }
        }
        result
    }

    /// Build the runtime now instead of on the first request.
    pub fn warm(&self) -> ClassifierResult<()> {
        self.lifecycle.ensure_ready().map(|_| ())
    }

    #[must_use]
    pub fn health(&self) -> HealthDescriptor {
        HealthDescriptor {
            status: HEALTH_STATUS,
            model: MODEL_NAME,
        }
    }

    #[must_use]
    pub fn readiness(&self) -> LifecycleSnapshot {
        self.lifecycle.snapshot()
    }
}
