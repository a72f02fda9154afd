//! Adapter for single-stage detectors.

use ndarray::ArrayView4;

use super::{AdaptedModel, DetectionOutputs, SingleStageDetector, check_input};
use crate::error::ModelError;

/// Wraps a [`SingleStageDetector`] into the fixed four-output contract.
pub struct SingleStageAdapter<'m, D: SingleStageDetector + ?Sized> {
    model: &'m D,
    max_per_img: usize,
}

impl<'m, D: SingleStageDetector + ?Sized> SingleStageAdapter<'m, D> {
    pub fn new(model: &'m D, max_per_img: usize) -> Self {
        Self { model, max_per_img }
    }

    pub fn model(&self) -> &'m D {
        self.model
    }
}

impl<D: SingleStageDetector + ?Sized> AdaptedModel for SingleStageAdapter<'_, D> {
    fn input_channels(&self) -> usize {
        self.model.input_channels()
    }

    fn max_detections(&self) -> usize {
        self.max_per_img
    }

    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<DetectionOutputs, ModelError> {
        check_input(&input, self.model.input_channels())?;
        let batch = input.shape()[0];

        let features = self.model.extract_features(input)?;
        let detections = self.model.predict(&features)?;
        if detections.len() != batch {
            return Err(ModelError::stage(
                "dense prediction",
                format!("expected {batch} detection lists, got {}", detections.len()),
            ));
        }

        Ok(DetectionOutputs::from_detections(detections, self.max_per_img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DensePrediction, FeatureExtraction, RawDetection};
    use ndarray::Array4;

    /// Emits one detection per image scored by the mean intensity.
    struct MeanDetector;

    impl FeatureExtraction for MeanDetector {
        fn input_channels(&self) -> usize {
            3
        }

        fn extract_features(
            &self,
            input: ArrayView4<'_, f32>,
        ) -> Result<Vec<Array4<f32>>, ModelError> {
            Ok(vec![input.to_owned()])
        }
    }

    impl DensePrediction for MeanDetector {
        fn predict(&self, features: &[Array4<f32>]) -> Result<Vec<Vec<RawDetection>>, ModelError> {
            let maps = &features[0];
            let (_, _, h, w) = maps.dim();
            Ok(maps
                .outer_iter()
                .map(|image| {
                    vec![RawDetection {
                        bbox: [0.0, 0.0, w as f32, h as f32],
                        score: image.mean().unwrap_or(0.0),
                        class_id: 1,
                    }]
                })
                .collect())
        }
    }

    #[test]
    fn test_single_stage_contract() {
        let detector = MeanDetector;
        let adapter = SingleStageAdapter::new(&detector, 5);
        let input = Array4::<f32>::from_elem((1, 3, 8, 6), 0.25);

        let out = adapter.forward(input.view()).unwrap();
        assert_eq!(out.shapes(), [vec![1, 1], vec![1, 5, 4], vec![1, 5], vec![1, 5]]);
        assert_eq!(out.num_detections[[0, 0]], 1);
        assert_eq!(out.boxes[[0, 0, 2]], 6.0);
        assert!((out.scores[[0, 0]] - 0.25).abs() < 1e-6);
    }
}
