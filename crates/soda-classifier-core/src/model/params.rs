//! Binding named tensors to architecture slots.
//!
//! Learned parameters are strict: a missing key or a wrong shape fails the
//! load. Batch-norm running statistics are auxiliary buffers: a missing or
//! mis-shaped buffer falls back to identity statistics and is reported.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};

use crate::error::{ClassifierError, ClassifierResult};

const BATCHES_TRACKED_SUFFIX: &str = ".num_batches_tracked";

/// Outcome of binding a state dict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Tensors bound from the artifact.
    pub bound: usize,
    /// Buffers replaced by defaults.
    pub defaulted: Vec<String>,
    /// Keys skipped on purpose (`num_batches_tracked`).
    pub ignored: Vec<String>,
    /// Keys the architecture has no slot for.
    pub unexpected: Vec<String>,
}

impl LoadReport {
    /// Every slot was filled from the artifact.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.defaulted.is_empty() && self.unexpected.is_empty()
    }
}

/// Source of named tensors for one load.
pub struct ParamSource {
    tensors: HashMap<String, Tensor>,
    remaining: BTreeSet<String>,
    device: Device,
    origin: PathBuf,
    report: LoadReport,
}

impl ParamSource {
    /// `origin` is used in error messages only.
    pub fn new(tensors: HashMap<String, Tensor>, device: &Device, origin: impl AsRef<Path>) -> Self {
        let mut report = LoadReport::default();
        let mut remaining = BTreeSet::new();
        for name in tensors.keys() {
            if name.ends_with(BATCHES_TRACKED_SUFFIX) {
                report.ignored.push(name.clone());
            } else {
                remaining.insert(name.clone());
            }
        }
        report.ignored.sort();

        Self {
            tensors,
            remaining,
            device: device.clone(),
            origin: origin.as_ref().to_path_buf(),
            report,
        }
    }

    /// Fetch a learned parameter with an exact shape.
    pub fn required(&mut self, name: &str, shape: &[usize]) -> ClassifierResult<Tensor> {
        let tensor = self.tensors.get(name).ok_or_else(|| {
            ClassifierError::weights_load(&self.origin, format!("missing parameter '{name}'"))
        })?;

        if tensor.dims() != shape {
            return Err(ClassifierError::weights_load(
                &self.origin,
                format!(
                    "parameter '{name}' has shape {:?}, expected {shape:?}",
                    tensor.dims()
                ),
            ));
        }

        let tensor = self.place(name, tensor.clone())?;
        self.remaining.remove(name);
        self.report.bound += 1;
        Ok(tensor)
    }

    /// Fetch an auxiliary buffer, or a constant-filled default.
    pub fn buffer_or(&mut self, name: &str, shape: &[usize], default: f64) -> ClassifierResult<Tensor> {
        let usable = match self.tensors.get(name) {
            Some(t) if t.dims() == shape => Some(t.clone()),
            Some(t) => {
                tracing::warn!(
                    buffer = name,
                    actual = ?t.dims(),
                    expected = ?shape,
                    "Buffer shape mismatch, using default"
                );
                None
            }
            None => {
                tracing::warn!(buffer = name, "Buffer missing, using default");
                None
            }
        };
        self.remaining.remove(name);

        match usable {
            Some(t) => {
                self.report.bound += 1;
                self.place(name, t)
            }
            None => {
                self.report.defaulted.push(name.to_string());
                let filled = Tensor::ones(shape, DType::F32, &self.device)
                    .and_then(|t| t.affine(default, 0.0))
                    .map_err(|e| ClassifierError::weights_load(&self.origin, e.to_string()))?;
                Ok(filled)
            }
        }
    }

    /// Close the source, recording keys never requested.
    pub fn finish(mut self) -> LoadReport {
        self.report.unexpected = self.remaining.into_iter().collect();
        for key in &self.report.unexpected {
            tracing::debug!(key = %key, "Ignoring unexpected key in weights artifact");
        }
        self.report
    }

    fn place(&self, name: &str, tensor: Tensor) -> ClassifierResult<Tensor> {
        tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.to_device(&self.device))
            .map_err(|e| {
                ClassifierError::weights_load(&self.origin, format!("cannot place '{name}': {e}"))
            })
    }
}
