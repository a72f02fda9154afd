//! Capability traits a detector implements to be adaptable.

use ndarray::{Array4, ArrayView4};

use crate::error::ModelError;
use crate::rect::Rect;

/// Region proposal emitted by the first stage of a two-stage detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    pub bbox: Rect,
    pub objectness: f32,
}

/// Final detection before padding into fixed-size outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// Bounding box: [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// Class ID
    pub class_id: usize,
}

/// Backbone (and neck) of a detector.
pub trait FeatureExtraction {
    /// Expected channel count of the input image tensor.
    fn input_channels(&self) -> usize;

    /// Compute feature maps for a `[batch, channels, height, width]` input.
    ///
    /// Every returned map must keep the input batch size as its first axis.
    fn extract_features(&self, input: ArrayView4<'_, f32>) -> Result<Vec<Array4<f32>>, ModelError>;
}

/// Region proposal and box refinement heads of a two-stage detector.
pub trait ProposalRefinement {
    /// Produce a variable-length proposal list per image.
    fn propose(&self, features: &[Array4<f32>]) -> Result<Vec<Vec<Proposal>>, ModelError>;

    /// Classify and refine proposals into detections, one list per image.
    fn refine(
        &self,
        features: &[Array4<f32>],
        proposals: &[Vec<Proposal>],
    ) -> Result<Vec<Vec<RawDetection>>, ModelError>;
}

/// Dense prediction head of a single-stage detector.
pub trait DensePrediction {
    fn predict(&self, features: &[Array4<f32>]) -> Result<Vec<Vec<RawDetection>>, ModelError>;
}

/// Feature extraction followed by proposal refinement.
pub trait TwoStageDetector: FeatureExtraction + ProposalRefinement {}

impl<T: FeatureExtraction + ProposalRefinement + ?Sized> TwoStageDetector for T {}

/// Feature extraction followed by dense prediction.
pub trait SingleStageDetector: FeatureExtraction + DensePrediction {}

impl<T: FeatureExtraction + DensePrediction + ?Sized> SingleStageDetector for T {}
