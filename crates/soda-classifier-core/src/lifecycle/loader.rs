//! Runtime construction, the unit of work behind one initialization attempt.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{ClassifierConfig, DevicePolicy};
use crate::device::{device_label, select_device};
use crate::error::{ClassifierError, ClassifierResult};
use crate::model::{ForwardPass, ModelRuntime};
use crate::weights::WeightsStore;

/// Builds a fresh runtime. Called at most once per initialization attempt.
pub trait RuntimeLoader: Send + Sync {
    fn load(&self) -> ClassifierResult<Arc<dyn ForwardPass>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Loads the ResNet-18 classifier from a weights artifact.
#[derive(Debug, Clone)]
pub struct ResNetLoader {
    store: WeightsStore,
    device: DevicePolicy,
    serialize_forward: bool,
}

impl ResNetLoader {
    pub fn new(store: WeightsStore, device: DevicePolicy) -> Self {
        Self {
            store,
            device,
            serialize_forward: false,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut store = WeightsStore::new(config.weights_path.clone());
        if let Some(sha) = &config.weights_sha256 {
            store = store.with_checksum(sha.clone());
        }
        Self {
            store,
            device: config.device,
            serialize_forward: config.serialize_forward,
        }
    }
}

impl RuntimeLoader for ResNetLoader {
    /// # Errors
    ///
    /// - `WeightsNotFound` before any device work if the artifact is absent
    /// - `WeightsLoad` on checksum, parse or binding failure
    /// - `DeviceInit` if the device cannot be created
    fn load(&self) -> ClassifierResult<Arc<dyn ForwardPass>> {
        let start = Instant::now();

        if !self.store.exists() {
            return Err(ClassifierError::WeightsNotFound {
                path: self.store.path().to_path_buf(),
            });
        }
        self.store.verify_checksum()?;

        let device = select_device(self.device)?;
        let runtime = ModelRuntime::from_store(&self.store, &device, self.serialize_forward)?;

        tracing::info!(
            path = %self.store.path().display(),
            device = device_label(&device),
            duration_ms = start.elapsed().as_millis() as u64,
            "Model runtime loaded"
        );
        Ok(Arc::new(runtime))
    }

    fn describe(&self) -> String {
        format!("resnet18 from {} ({})", self.store.path().display(), self.device)
    }
}
