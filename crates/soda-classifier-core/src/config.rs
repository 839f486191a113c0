//! Classifier configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, ClassifierResult};

/// Compute device selection policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// CUDA, then Metal, then CPU.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
}

impl fmt::Display for DevicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePolicy {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            other => Err(ClassifierError::invalid_config(
                "classifier.device",
                format!("unknown device policy '{other}', expected 'auto' or 'cpu'"),
            )),
        }
    }
}

/// Ordered pair of class names, index-aligned with the network outputs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ClassLabels([String; 2]);

impl ClassLabels {
    /// Create a label pair.
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self([first.into(), second.into()])
    }

    /// Label for a class index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Both labels in output order.
    #[must_use]
    pub fn as_array(&self) -> &[String; 2] {
        &self.0
    }

    /// Reject empty or duplicate labels.
    pub fn validate(&self) -> ClassifierResult<()> {
        if self.0.iter().any(|l| l.trim().is_empty()) {
            return Err(ClassifierError::invalid_config(
                "classifier.class_labels",
                "labels must not be empty",
            ));
        }
        if self.0[0] == self.0[1] {
            return Err(ClassifierError::invalid_config(
                "classifier.class_labels",
                format!("labels must be distinct, got '{}' twice", self.0[0]),
            ));
        }
        Ok(())
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self::new("empty", "full")
    }
}

/// Configuration for the inference core.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClassifierConfig {
    /// Path to the weights artifact (`.pth`, `.pt`, `.bin` or `.safetensors`).
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,

    /// Expected SHA-256 of the artifact, hex encoded. Unchecked when absent.
    #[serde(default)]
    pub weights_sha256: Option<String>,

    /// Class names in network output order.
    #[serde(default)]
    pub class_labels: ClassLabels,

    /// Device selection policy.
    #[serde(default)]
    pub device: DevicePolicy,

    /// Serialize forward passes behind a lock.
    #[serde(default)]
    pub serialize_forward: bool,
}

fn default_weights_path() -> PathBuf {
    PathBuf::from("soda_bottle_classifier_resnet18.pth")
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            weights_sha256: None,
            class_labels: ClassLabels::default(),
            device: DevicePolicy::default(),
            serialize_forward: false,
        }
    }
}

impl ClassifierConfig {
    /// Validate configuration values.
    ///
    /// Only checks shape of the values. A missing weights file is not a
    /// configuration error: it surfaces lazily as `WeightsNotFound`.
    pub fn validate(&self) -> ClassifierResult<()> {
        if self.weights_path.as_os_str().is_empty() {
            return Err(ClassifierError::invalid_config(
                "classifier.weights_path",
                "path must not be empty",
            ));
        }

        if let Some(checksum) = &self.weights_sha256 {
            let valid = checksum.len() == 64 && checksum.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                return Err(ClassifierError::invalid_config(
                    "classifier.weights_sha256",
                    "expected 64 hex characters",
                ));
            }
        }

        self.class_labels.validate()
    }
}
