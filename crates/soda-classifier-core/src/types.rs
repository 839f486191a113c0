//! Data passed between the pipeline stages.

use candle_core::{Device, Tensor};
use serde::Serialize;

use crate::error::{ClassifierError, ClassifierResult};

/// Number of output classes.
pub const NUM_CLASSES: usize = 2;

/// Channels of a [`NormalizedTensor`].
pub const INPUT_CHANNELS: usize = 3;

/// Height and width of a [`NormalizedTensor`].
pub const INPUT_SIZE: usize = 224;

/// Element count of a [`NormalizedTensor`].
pub const INPUT_LEN: usize = INPUT_CHANNELS * INPUT_SIZE * INPUT_SIZE;

/// Standardized RGB image, 3x224x224, channel-major.
///
/// Host memory only. The runtime uploads it to its device per call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    /// Wrap channel-major data.
    ///
    /// # Errors
    ///
    /// `Shape` if `data` does not hold exactly 3*224*224 values.
    pub fn from_chw(data: Vec<f32>) -> ClassifierResult<Self> {
        if data.len() != INPUT_LEN {
            return Err(ClassifierError::shape(format!(
                "expected {INPUT_LEN} values for a {INPUT_CHANNELS}x{INPUT_SIZE}x{INPUT_SIZE} tensor, got {}",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    /// Always `(3, 224, 224)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Plane for one channel (0 = R, 1 = G, 2 = B).
    ///
    /// # Panics
    ///
    /// Panics if `channel >= 3`.
    #[must_use]
    pub fn channel(&self, channel: usize) -> &[f32] {
        let plane = INPUT_SIZE * INPUT_SIZE;
        &self.data[channel * plane..(channel + 1) * plane]
    }

    /// Batch of one, `(1, 3, 224, 224)`, on `device`.
    pub fn to_batch(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(
            &self.data,
            (1, INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE),
            device,
        )
    }
}

/// Unnormalized scores, one per class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLogits(pub [f32; NUM_CLASSES]);

/// Outcome of one classification.
///
/// # Invariants
///
/// - `class_probabilities` sums to 1 within float tolerance
/// - `predicted_class_index` is the argmax of `class_probabilities`
/// - `confidence == class_probabilities[predicted_class_index]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_class_index: usize,
    pub confidence: f32,
    pub class_probabilities: [f32; NUM_CLASSES],
    pub class_labels: [String; NUM_CLASSES],
}

impl PredictionResult {
    /// Label of the predicted class.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.class_labels[self.predicted_class_index]
    }
}
