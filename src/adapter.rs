//! Adapters normalizing multi-stage detectors into a fixed-contract graph.
//!
//! A detector is described by the capabilities it offers rather than by a
//! class hierarchy. Two-stage detectors implement [`FeatureExtraction`] and
//! [`ProposalRefinement`]; single-stage detectors implement
//! [`FeatureExtraction`] and [`DensePrediction`]. Each family has one adapter
//! that exposes the same single-input, four-output [`AdaptedModel`] contract.

mod capability;
mod outputs;
mod single_stage;
mod two_stage;

pub use capability::{
    DensePrediction, FeatureExtraction, Proposal, ProposalRefinement, RawDetection,
    SingleStageDetector, TwoStageDetector,
};
pub use outputs::{DetectionOutputs, OUTPUT_SLOTS};
pub use single_stage::SingleStageAdapter;
pub use two_stage::TwoStageAdapter;

use ndarray::ArrayView4;

use crate::error::ModelError;

/// A single-tensor-in, fixed-tuple-out callable.
pub trait AdaptedModel {
    /// Channel count the input tensor must carry.
    fn input_channels(&self) -> usize;

    /// Number of detection slots per image in every output.
    fn max_detections(&self) -> usize;

    /// Run the wrapped detector on a `[batch, channels, height, width]` tensor.
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<DetectionOutputs, ModelError>;

    /// Number of output tensors produced by [`AdaptedModel::forward`].
    fn output_arity(&self) -> usize {
        OUTPUT_SLOTS.len()
    }
}

fn check_input(input: &ArrayView4<'_, f32>, channels: usize) -> Result<(), ModelError> {
    let shape = input.shape();
    if shape[1] != channels || shape.contains(&0) {
        return Err(ModelError::InvalidInput {
            expected: format!("[batch, {channels}, height, width] with non-empty dimensions"),
            got: shape.to_vec(),
        });
    }
    Ok(())
}

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnBackbone, BurnFeatureModel};
