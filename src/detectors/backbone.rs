use ndarray::{Array4, ArrayView4, s};

use crate::adapter::FeatureExtraction;
use crate::error::ModelError;

/// Strided average pooling backbone producing a single feature level.
#[derive(Debug, Clone)]
pub struct AvgPoolBackbone {
    channels: usize,
    stride: usize,
}

impl AvgPoolBackbone {
    pub fn new(channels: usize, stride: usize) -> Self {
        Self {
            channels,
            stride: stride.max(1),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl FeatureExtraction for AvgPoolBackbone {
    fn input_channels(&self) -> usize {
        self.channels
    }

    fn extract_features(&self, input: ArrayView4<'_, f32>) -> Result<Vec<Array4<f32>>, ModelError> {
        let (batch, channels, height, width) = input.dim();
        let stride = self.stride;
        let mut out = Array4::zeros((
            batch,
            channels,
            height.div_ceil(stride),
            width.div_ceil(stride),
        ));

        for ((n, c, oy, ox), v) in out.indexed_iter_mut() {
            let ys = oy * stride..((oy + 1) * stride).min(height);
            let xs = ox * stride..((ox + 1) * stride).min(width);
            *v = input.slice(s![n, c, ys, xs]).mean().unwrap_or(0.0);
        }
        Ok(vec![out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooling_shape_and_values() {
        let backbone = AvgPoolBackbone::new(1, 2);
        let input = Array4::from_shape_fn((1, 1, 3, 4), |(_, _, y, x)| (y * 4 + x) as f32);

        let features = backbone.extract_features(input.view()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].shape(), &[1, 1, 2, 2]);
        // top-left window: 0, 1, 4, 5
        assert_eq!(features[0][[0, 0, 0, 0]], 2.5);
        // bottom-right partial window: 10, 11
        assert_eq!(features[0][[0, 0, 1, 1]], 10.5);
    }
}
