//! Weights artifact access.
//!
//! The artifact is an opaque, externally supplied state dict for the
//! ResNet-18 classifier. Two encodings are accepted, picked by extension:
//!
//! | Extension | Format | Reader |
//! |-----------|--------|--------|
//! | `.safetensors` | SafeTensors | `candle_core::safetensors::load` |
//! | `.pth`, `.pt`, `.bin` | PyTorch pickle (zip) | `candle_core::pickle::read_all` |
//!
//! Tensors are always read onto the CPU; the runtime moves them to its device.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor};
use sha2::{Digest, Sha256};

use crate::error::{ClassifierError, ClassifierResult};

/// Prefix added by `torch.nn.DataParallel` checkpoints.
const DATA_PARALLEL_PREFIX: &str = "module.";

/// On-disk encoding of the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    SafeTensors,
    PyTorch,
}

/// Location and integrity policy of the weights artifact.
#[derive(Debug, Clone)]
pub struct WeightsStore {
    path: PathBuf,
    expected_sha256: Option<String>,
}

impl WeightsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            expected_sha256: None,
        }
    }

    /// Require the artifact to hash to `sha256_hex`.
    #[must_use]
    pub fn with_checksum(mut self, sha256_hex: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256_hex.into().to_lowercase());
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Encoding implied by the file extension.
    pub fn format(&self) -> ClassifierResult<WeightsFormat> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some("safetensors") => Ok(WeightsFormat::SafeTensors),
            Some("pth" | "pt" | "bin") => Ok(WeightsFormat::PyTorch),
            other => Err(ClassifierError::weights_load(
                &self.path,
                format!(
                    "unsupported weights extension {:?}, expected .safetensors, .pth, .pt or .bin",
                    other.unwrap_or("")
                ),
            )),
        }
    }

    /// Compare the artifact's SHA-256 against the configured checksum.
    ///
    /// No-op when no checksum is configured.
    pub fn verify_checksum(&self) -> ClassifierResult<()> {
        let Some(expected) = &self.expected_sha256 else {
            return Ok(());
        };

        let actual = self.sha256_hex()?;
        if &actual != expected {
            tracing::error!(
                path = %self.path.display(),
                expected = %expected,
                actual = %actual,
                "Weights checksum mismatch"
            );
            return Err(ClassifierError::weights_load(
                &self.path,
                format!("checksum mismatch: expected {expected}, got {actual}"),
            ));
        }

        tracing::debug!(path = %self.path.display(), "Weights checksum verified");
        Ok(())
    }

    /// Hex SHA-256 of the artifact.
    pub fn sha256_hex(&self) -> ClassifierResult<String> {
        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(|e| self.io_error(e))?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Read every tensor in the artifact onto the CPU.
    ///
    /// Keys have the DataParallel `module.` prefix removed.
    ///
    /// # Errors
    ///
    /// - `WeightsNotFound` if the file is absent
    /// - `WeightsLoad` if the extension is unsupported or parsing fails
    pub fn read_tensors(&self) -> ClassifierResult<HashMap<String, Tensor>> {
        if !self.exists() {
            return Err(ClassifierError::WeightsNotFound {
                path: self.path.clone(),
            });
        }

        let start = Instant::now();
        let format = self.format()?;
        let raw: Vec<(String, Tensor)> = match format {
            WeightsFormat::SafeTensors => candle_core::safetensors::load(&self.path, &Device::Cpu)
                .map_err(|e| ClassifierError::weights_load(&self.path, e.to_string()))?
                .into_iter()
                .collect(),
            WeightsFormat::PyTorch => candle_core::pickle::read_all(&self.path)
                .map_err(|e| ClassifierError::weights_load(&self.path, e.to_string()))?,
        };

        if raw.is_empty() {
            return Err(ClassifierError::weights_load(
                &self.path,
                "artifact contains no tensors",
            ));
        }

        let tensors: HashMap<String, Tensor> = raw
            .into_iter()
            .map(|(name, tensor)| {
                let name = match name.strip_prefix(DATA_PARALLEL_PREFIX) {
                    Some(stripped) => stripped.to_string(),
                    None => name,
                };
                (name, tensor)
            })
            .collect();

        tracing::info!(
            path = %self.path.display(),
            format = ?format,
            tensors = tensors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Read weights artifact"
        );

        Ok(tensors)
    }

    fn io_error(&self, err: io::Error) -> ClassifierError {
        if err.kind() == io::ErrorKind::NotFound {
            ClassifierError::WeightsNotFound {
                path: self.path.clone(),
            }
        } else {
            ClassifierError::weights_load(&self.path, err.to_string())
        }
    }
}
