//! Adapter for two-stage detectors.

use ndarray::ArrayView4;
use tracing::trace;

use super::{AdaptedModel, DetectionOutputs, TwoStageDetector, check_input};
use crate::error::ModelError;

/// Wraps a [`TwoStageDetector`] into the fixed four-output contract.
///
/// Proposal lists stay inside the adapter; only padded tensors leave it.
pub struct TwoStageAdapter<'m, D: TwoStageDetector + ?Sized> {
    model: &'m D,
    max_per_img: usize,
}

impl<'m, D: TwoStageDetector + ?Sized> TwoStageAdapter<'m, D> {
    pub fn new(model: &'m D, max_per_img: usize) -> Self {
        Self { model, max_per_img }
    }

    /// The wrapped detector.
    pub fn model(&self) -> &'m D {
        self.model
    }
}

impl<D: TwoStageDetector + ?Sized> AdaptedModel for TwoStageAdapter<'_, D> {
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
        let proposals = self.model.propose(&features)?;
        if proposals.len() != batch {
            return Err(ModelError::stage(
                "proposal",
                format!("expected {batch} proposal lists, got {}", proposals.len()),
            ));
        }
        trace!(
            proposals = proposals.iter().map(Vec::len).sum::<usize>(),
            "first stage done"
        );

        let detections = self.model.refine(&features, &proposals)?;
        if detections.len() != batch {
            return Err(ModelError::stage(
                "refinement",
                format!("expected {batch} detection lists, got {}", detections.len()),
            ));
        }

        Ok(DetectionOutputs::from_detections(detections, self.max_per_img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{FeatureExtraction, Proposal, ProposalRefinement, RawDetection};
    use crate::rect::Rect;
    use ndarray::{Array4, Axis};

    /// One proposal per bright pixel; each proposal becomes a detection.
    struct BrightPixelDetector;

    impl FeatureExtraction for BrightPixelDetector {
        fn input_channels(&self) -> usize {
            1
        }

        fn extract_features(
            &self,
            input: ArrayView4<'_, f32>,
        ) -> Result<Vec<Array4<f32>>, ModelError> {
            Ok(vec![input.to_owned()])
        }
    }

    impl ProposalRefinement for BrightPixelDetector {
        fn propose(&self, features: &[Array4<f32>]) -> Result<Vec<Vec<Proposal>>, ModelError> {
            Ok(features[0]
                .axis_iter(Axis(0))
                .map(|image| {
                    image
                        .indexed_iter()
                        .filter(|(_, v)| **v > 0.5)
                        .map(|((_, y, x), v)| Proposal {
                            bbox: Rect::new(x as f32, y as f32, 1.0, 1.0),
                            objectness: *v,
                        })
                        .collect()
                })
                .collect())
        }

        fn refine(
            &self,
            _features: &[Array4<f32>],
            proposals: &[Vec<Proposal>],
        ) -> Result<Vec<Vec<RawDetection>>, ModelError> {
            Ok(proposals
                .iter()
                .map(|list| {
                    list.iter()
                        .map(|p| RawDetection {
                            bbox: p.bbox.to_tlbr(),
                            score: p.objectness,
                            class_id: 0,
                        })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_variable_proposals_become_fixed_outputs() {
        let detector = BrightPixelDetector;
        let adapter = TwoStageAdapter::new(&detector, 2);

        let mut input = Array4::<f32>::zeros((2, 1, 4, 4));
        input[[0, 0, 1, 1]] = 0.9;
        input[[0, 0, 2, 3]] = 0.7;
        input[[0, 0, 3, 3]] = 0.6;

        let out = adapter.forward(input.view()).unwrap();
        assert_eq!(adapter.output_arity(), 4);
        assert_eq!(out.shapes(), [vec![2, 1], vec![2, 2, 4], vec![2, 2], vec![2, 2]]);
        assert_eq!(out.num_detections[[0, 0]], 2);
        assert_eq!(out.num_detections[[1, 0]], 0);
        assert_eq!(out.boxes[[0, 0, 0]], 1.0);
        assert!((out.scores[[0, 1]] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_channel_mismatch() {
        let detector = BrightPixelDetector;
        let adapter = TwoStageAdapter::new(&detector, 2);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));

        let err = adapter.forward(input.view()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput { .. }));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let detector = BrightPixelDetector;
        let adapter = TwoStageAdapter::new(&detector, 4);
        let input = Array4::from_shape_fn((1, 1, 5, 5), |(_, _, y, x)| ((x * 7 + y * 3) % 10) as f32 / 10.0);

        let first = adapter.forward(input.view()).unwrap();
        let second = adapter.forward(input.view()).unwrap();
        assert_eq!(first, second);
    }
}
