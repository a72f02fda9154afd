//! Burn-backed feature extraction.
//!
//! This module provides a `BurnBackbone` that implements `FeatureExtraction`
//! for backbones built with the Burn framework, so that a Burn network can
//! serve as the first half of a detector handed to an adapter.
//!
//! # Example
//!
//! ```ignore
//! use det2engine::adapter::{BurnBackbone, BurnFeatureModel};
//! use burn::backend::NdArray;
//!
//! struct MyResNet { /* ... */ }
//!
//! impl BurnFeatureModel<NdArray> for MyResNet {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<burn::tensor::Tensor<NdArray, 4>> {
//!         // Run the backbone and neck
//!     }
//! }
//!
//! let backbone = BurnBackbone::new(MyResNet::load("resnet.bin"), Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::{Array4, ArrayView4};

use super::FeatureExtraction;
use crate::error::ModelError;

/// Trait for Burn-based backbones.
pub trait BurnFeatureModel<B: Backend>: Send + Sync {
    /// Run forward pass on a `[batch, channels, height, width]` tensor and
    /// return one feature map per pyramid level.
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>>;

    /// Channel count of the expected input.
    fn input_channels(&self) -> usize {
        3
    }
}

/// Burn backbone implementing `FeatureExtraction`.
pub struct BurnBackbone<B: Backend, M: BurnFeatureModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnFeatureModel<B>> BurnBackbone<B, M> {
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn to_burn(&self, input: ArrayView4<'_, f32>) -> Tensor<B, 4> {
        let (batch, channels, height, width) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device)
            .reshape([batch, channels, height, width])
    }

    fn to_ndarray(tensor: Tensor<B, 4>) -> Result<Array4<f32>, ModelError> {
        let [b, c, h, w] = tensor.dims();
        let data = tensor
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| ModelError::stage("feature extraction", format!("{err:?}")))?;
        Array4::from_shape_vec((b, c, h, w), data)
            .map_err(|err| ModelError::stage("feature extraction", err.to_string()))
    }
}

impl<B: Backend, M: BurnFeatureModel<B>> FeatureExtraction for BurnBackbone<B, M> {
    fn input_channels(&self) -> usize {
        self.model.input_channels()
    }

    fn extract_features(&self, input: ArrayView4<'_, f32>) -> Result<Vec<Array4<f32>>, ModelError> {
        let tensor = self.to_burn(input);
        self.model
            .forward(tensor)
            .into_iter()
            .map(Self::to_ndarray)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    struct Identity;

    impl BurnFeatureModel<NdArray> for Identity {
        fn forward(&self, input: Tensor<NdArray, 4>) -> Vec<Tensor<NdArray, 4>> {
            vec![input]
        }
    }

    #[test]
    fn test_features_survive_round_trip() {
        let backbone = BurnBackbone::<NdArray, _>::new(Identity, Default::default());
        let input = Array4::from_shape_fn((1, 3, 2, 2), |(_, c, y, x)| (c * 4 + y * 2 + x) as f32);

        let features = backbone.extract_features(input.view()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0], input);
    }
}
