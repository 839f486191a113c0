//! Request-level inference: preprocess, forward, softmax, argmax.

use crate::config::ClassLabels;
use crate::error::ClassifierResult;
use crate::lifecycle::ModelRuntimeHandle;
use crate::types::{PredictionResult, RawLogits, NUM_CLASSES};

/// Softmax with the max logit subtracted first.
///
/// Large logits (e.g. `[1000, 0]`) do not overflow.
#[must_use]
pub fn softmax(logits: &[f32; NUM_CLASSES]) -> [f32; NUM_CLASSES] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.map(|v| (v - max).exp());
    let sum: f32 = exps.iter().sum();
    exps.map(|e| e / sum)
}

/// Index of the largest value. Ties go to the lowest index.
#[must_use]
pub fn argmax(values: &[f32; NUM_CLASSES]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Turn logits into a [`PredictionResult`].
#[must_use]
pub fn decide(logits: RawLogits, labels: &ClassLabels) -> PredictionResult {
    let probs = softmax(&logits.0);
    let idx = argmax(&probs);
    PredictionResult {
        predicted_class_index: idx,
        confidence: probs[idx],
        class_probabilities: probs,
        class_labels: labels.as_array().clone(),
    }
}

/// Runs one classification against a ready runtime handle.
///
/// Borrows the handle for the duration of one request; nothing here touches
/// lifecycle state.
pub struct InferenceEngine<'a> {
    handle: &'a ModelRuntimeHandle,
    labels: &'a ClassLabels,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(handle: &'a ModelRuntimeHandle, labels: &'a ClassLabels) -> Self {
        Self { handle, labels }
    }

    /// Classify one encoded image.
    ///
    /// # Errors
    ///
    /// - `Decode` / `Shape` from preprocessing
    /// - `RuntimeExecution` from the forward pass
    pub fn predict(&self, raw: &[u8]) -> ClassifierResult<PredictionResult> {
        let input = self.handle.pipeline().preprocess(raw)?;
        let logits = self.handle.runtime().forward(&input)?;
        let result = decide(logits, self.labels);

        tracing::debug!(
            generation = self.handle.generation(),
            logits = ?logits.0,
            prediction = result.label(),
            confidence = result.confidence,
            "Classified image"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        for logits in [[0.0, 0.0], [2.0, -1.0], [-30.0, 12.5], [1e-3, 1e-3]] {
            let probs = softmax(&logits);
            assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 0.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs[0] - 1.0).abs() < 1e-6);
        assert!(probs[1] < 1e-6);
    }

    #[test]
    fn test_argmax_tie_picks_first() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.9]), 1);
        assert_eq!(argmax(&[0.9, 0.1]), 0);
    }

    #[test]
    fn test_decide_equal_logits() {
        let result = decide(RawLogits([3.0, 3.0]), &ClassLabels::default());
        assert_eq!(result.predicted_class_index, 0);
        assert_eq!(result.label(), "empty");
        assert!((result.confidence - 0.5).abs() < 1e-6);
        assert_eq!(result.class_probabilities, [0.5, 0.5]);
    }

    #[test]
    fn test_decide_confidence_matches_probability() {
        let result = decide(RawLogits([-0.3, 1.7]), &ClassLabels::default());
        assert_eq!(result.predicted_class_index, 1);
        assert_eq!(result.label(), "full");
        assert_eq!(result.confidence, result.class_probabilities[1]);
        assert!(result.confidence > 0.5);
    }
}
