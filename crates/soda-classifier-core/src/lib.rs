//! Inference core for the soda bottle classifier.
//!
//! Classifies one image as `empty` or `full` with a ResNet-18 whose head has
//! two outputs. Transport-agnostic: the HTTP surface lives in
//! `soda-classifier-server`.
//!
//! # Architecture
//!
//! - **WeightsStore**: locates, verifies and reads the weights artifact
//! - **PreprocessingPipeline**: encoded bytes to a normalized 3x224x224 tensor
//! - **ModelRuntime**: device-resident network, pure forward pass
//! - **InferenceEngine**: preprocess, forward, softmax, argmax
//! - **LifecycleManager**: single-flight lazy initialization with retry
//! - **ClassifierService**: the facade transports call
//!
//! # Example
//!
//! ```rust
//! use soda_classifier_core::engine::{argmax, softmax};
//!
//! let probs = softmax(&[1000.0, 0.0]);
//! assert!(probs.iter().all(|p| p.is_finite()));
//! assert_eq!(argmax(&[0.5, 0.5]), 0);
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod preprocess;
pub mod service;
pub mod types;
pub mod weights;

pub use config::{ClassLabels, ClassifierConfig, DevicePolicy};
pub use engine::InferenceEngine;
pub use error::{ClassifierError, ClassifierResult};
pub use lifecycle::{
    InitializationState, LifecycleManager, LifecycleSnapshot, ModelRuntimeHandle, ResNetLoader,
    RuntimeLoader,
};
pub use model::{ForwardPass, ModelRuntime};
pub use preprocess::PreprocessingPipeline;
pub use service::{ClassifierService, HealthDescriptor};
pub use types::{NormalizedTensor, PredictionResult, RawLogits};
pub use weights::WeightsStore;
