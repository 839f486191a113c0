//! Device-resident network exposing a pure forward pass.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use parking_lot::Mutex;

use super::params::{LoadReport, ParamSource};
use super::resnet::ResNet18;
use crate::device::device_label;
use crate::error::{ClassifierError, ClassifierResult};
use crate::types::{NormalizedTensor, RawLogits, NUM_CLASSES};
use crate::weights::WeightsStore;

/// A network that maps one normalized image to class logits.
///
/// Implementations must be safe to call from many threads at once and must
/// not mutate shared parameters.
pub trait ForwardPass: Send + Sync {
    fn forward(&self, input: &NormalizedTensor) -> ClassifierResult<RawLogits>;

    /// Device the network lives on (`cpu`, `cuda`, `metal`).
    fn device_label(&self) -> &str;
}

/// ResNet-18 classifier placed on a device, inference mode only.
pub struct ModelRuntime {
    net: ResNet18,
    device: Device,
    forward_gate: Option<Mutex<()>>,
    report: LoadReport,
}

impl ModelRuntime {
    /// Bind a state dict and place the network on `device`.
    ///
    /// With `serialize_forward` set, concurrent forward calls are queued
    /// behind a lock instead of running in parallel.
    pub fn from_tensors(
        tensors: HashMap<String, Tensor>,
        device: &Device,
        origin: impl AsRef<Path>,
        serialize_forward: bool,
    ) -> ClassifierResult<Self> {
        let mut src = ParamSource::new(tensors, device, origin);
        let net = ResNet18::load(&mut src, NUM_CLASSES)?;
        let report = src.finish();

        if !report.defaulted.is_empty() {
            tracing::warn!(
                defaulted = report.defaulted.len(),
                "Some batch-norm statistics were missing and replaced by defaults"
            );
        }
        tracing::info!(
            bound = report.bound,
            ignored = report.ignored.len(),
            unexpected = report.unexpected.len(),
            device = device_label(device),
            "ResNet-18 parameters bound"
        );

        Ok(Self {
            net,
            device: device.clone(),
            forward_gate: serialize_forward.then(|| Mutex::new(())),
            report,
        })
    }

    /// Read, bind and place the artifact held by `store`.
    pub fn from_store(
        store: &WeightsStore,
        device: &Device,
        serialize_forward: bool,
    ) -> ClassifierResult<Self> {
        let tensors = store.read_tensors()?;
        Self::from_tensors(tensors, device, store.path(), serialize_forward)
    }

    #[must_use]
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn run(&self, input: &NormalizedTensor) -> candle_core::Result<Vec<f32>> {
        let batch = input.to_batch(&self.device)?;
        self.net
            .forward(&batch)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()
    }

    fn execution_error(&self, reason: String) -> ClassifierError {
        // Accelerator failures usually poison the context; CPU ones do not.
        ClassifierError::RuntimeExecution {
            device: device_label(&self.device).to_string(),
            reason,
            handle_unusable: !self.device.is_cpu(),
        }
    }
}

impl ForwardPass for ModelRuntime {
    fn forward(&self, input: &NormalizedTensor) -> ClassifierResult<RawLogits> {
        let _guard = self.forward_gate.as_ref().map(|gate| gate.lock());

        let values = self
            .run(input)
            .map_err(|e| self.execution_error(e.to_string()))?;

        let logits: [f32; NUM_CLASSES] = values.as_slice().try_into().map_err(|_| {
            ClassifierError::internal(format!(
                "network produced {} logits, expected {NUM_CLASSES}",
                values.len()
            ))
        })?;

        if logits.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::RuntimeExecution {
                device: device_label(&self.device).to_string(),
                reason: format!("non-finite logits {logits:?}"),
                handle_unusable: false,
            });
        }

        Ok(RawLogits(logits))
    }

    fn device_label(&self) -> &str {
        device_label(&self.device)
    }
}

impl std::fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("device", &device_label(&self.device))
            .field("serialized", &self.forward_gate.is_some())
            .field("report", &self.report)
            .finish()
    }
}
