//! Reference two-stage detector.
//!
//! The first stage scores every feature cell with a linear objectness head
//! and turns cells above `rpn_score_thr` into square anchors, so the number
//! of proposals depends on the image content. The second stage classifies
//! each proposal from the feature vector under its center and applies
//! class-wise NMS.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array4, ArrayView1, ArrayView4, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AvgPoolBackbone, ModelLoader};
use crate::adapter::{FeatureExtraction, Proposal, ProposalRefinement, RawDetection};
use crate::config::{DetectorConfig, TestConfig};
use crate::error::ModelError;
use crate::rect::{Rect, nms};

/// Checkpoint contents of an [`AnchorPoolDetector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorPoolWeights {
    /// Input pixels per feature cell.
    pub stride: usize,
    /// Anchor side length as a multiple of the stride.
    pub anchor_scale: f32,
    pub objectness: Vec<f32>,
    pub objectness_bias: f32,
    /// One row of `channels` weights per class.
    pub class_weights: Vec<Vec<f32>>,
    pub class_bias: Vec<f32>,
}

impl AnchorPoolWeights {
    /// Check the heads against each other and against the class count.
    fn validate(&self, num_classes: usize) -> Result<(), ModelError> {
        if self.stride == 0 {
            return Err(ModelError::Checkpoint("stride must be positive".into()));
        }
        if self.anchor_scale <= 0.0 {
            return Err(ModelError::Checkpoint("anchor_scale must be positive".into()));
        }
        if self.class_weights.len() != num_classes || self.class_bias.len() != num_classes {
            return Err(ModelError::Checkpoint(format!(
                "classification head has {} rows and {} biases, config expects {num_classes} classes",
                self.class_weights.len(),
                self.class_bias.len()
            )));
        }
        let channels = self.objectness.len();
        if let Some(row) = self.class_weights.iter().find(|row| row.len() != channels) {
            return Err(ModelError::Checkpoint(format!(
                "classification row has {} weights, objectness head has {channels}",
                row.len()
            )));
        }
        Ok(())
    }
}

/// Two-stage detector with a pluggable backbone.
pub struct AnchorPoolDetector<F: FeatureExtraction = AvgPoolBackbone> {
    backbone: F,
    objectness: Array1<f32>,
    objectness_bias: f32,
    class_weights: Vec<Array1<f32>>,
    class_bias: Vec<f32>,
    stride: usize,
    anchor_side: f32,
    test_cfg: TestConfig,
}

impl AnchorPoolDetector<AvgPoolBackbone> {
    /// Build the detector with the average-pooling backbone matching `weights.stride`.
    pub fn new(
        weights: AnchorPoolWeights,
        config: &DetectorConfig,
    ) -> Result<Self, ModelError> {
        if weights.objectness.len() != config.input_channels {
            return Err(ModelError::Checkpoint(format!(
                "objectness head has {} weights, config expects {} channels",
                weights.objectness.len(),
                config.input_channels
            )));
        }
        let backbone = AvgPoolBackbone::new(config.input_channels, weights.stride);
        Self::with_backbone(backbone, weights, config)
    }
}

impl<F: FeatureExtraction> AnchorPoolDetector<F> {
    /// Build the detector on top of an arbitrary backbone.
    ///
    /// The backbone's feature maps must have as many channels as the heads
    /// have weights and a spatial stride of `weights.stride`.
    pub fn with_backbone(
        backbone: F,
        weights: AnchorPoolWeights,
        config: &DetectorConfig,
    ) -> Result<Self, ModelError> {
        weights.validate(config.model.num_classes)?;
        Ok(Self {
            backbone,
            objectness: Array1::from(weights.objectness),
            objectness_bias: weights.objectness_bias,
            class_weights: weights
                .class_weights
                .into_iter()
                .map(Array1::from)
                .collect(),
            class_bias: weights.class_bias,
            stride: weights.stride,
            anchor_side: weights.stride as f32 * weights.anchor_scale,
            test_cfg: config.test_cfg.clone(),
        })
    }

    fn first_level<'a>(&self, features: &'a [Array4<f32>]) -> Result<&'a Array4<f32>, ModelError> {
        let level = features
            .first()
            .ok_or_else(|| ModelError::stage("proposal", "backbone produced no feature maps"))?;
        let channels = level.shape()[1];
        if channels != self.objectness.len() {
            return Err(ModelError::stage(
                "proposal",
                format!(
                    "feature map has {channels} channels, heads expect {}",
                    self.objectness.len()
                ),
            ));
        }
        Ok(level)
    }

    /// Image extent covered by a feature map, in input pixels.
    fn extent(&self, level: &Array4<f32>) -> (f32, f32) {
        let (_, _, h, w) = level.dim();
        ((w * self.stride) as f32, (h * self.stride) as f32)
    }

    fn classify(&self, feature: ArrayView1<'_, f32>) -> (usize, f32) {
        let logits: Vec<f32> = self
            .class_weights
            .iter()
            .zip(&self.class_bias)
            .map(|(row, bias)| row.dot(&feature) + bias)
            .collect();
        softmax_argmax(&logits)
    }
}

impl<F: FeatureExtraction> FeatureExtraction for AnchorPoolDetector<F> {
    fn input_channels(&self) -> usize {
        self.backbone.input_channels()
    }

    fn extract_features(&self, input: ArrayView4<'_, f32>) -> Result<Vec<Array4<f32>>, ModelError> {
        self.backbone.extract_features(input)
    }
}

impl<F: FeatureExtraction> ProposalRefinement for AnchorPoolDetector<F> {
    fn propose(&self, features: &[Array4<f32>]) -> Result<Vec<Vec<Proposal>>, ModelError> {
        let level = self.first_level(features)?;
        let (batch, _, height, width) = level.dim();
        let (img_w, img_h) = self.extent(level);
        let half = self.anchor_side / 2.0;

        let mut proposals = Vec::with_capacity(batch);
        for n in 0..batch {
            let mut image_proposals = Vec::new();
            for y in 0..height {
                for x in 0..width {
                    let feature = level.slice(s![n, .., y, x]);
                    let objectness = sigmoid(self.objectness.dot(&feature) + self.objectness_bias);
                    if objectness < self.test_cfg.rpn_score_thr {
                        continue;
                    }
                    let cx = (x as f32 + 0.5) * self.stride as f32;
                    let cy = (y as f32 + 0.5) * self.stride as f32;
                    image_proposals.push(Proposal {
                        bbox: Rect::from_tlbr(cx - half, cy - half, cx + half, cy + half)
                            .clip(img_w, img_h),
                        objectness,
                    });
                }
            }
            image_proposals.sort_by(|a, b| b.objectness.total_cmp(&a.objectness));
            image_proposals.truncate(self.test_cfg.rpn_max_proposals);
            proposals.push(image_proposals);
        }
        Ok(proposals)
    }

    fn refine(
        &self,
        features: &[Array4<f32>],
        proposals: &[Vec<Proposal>],
    ) -> Result<Vec<Vec<RawDetection>>, ModelError> {
        let level = self.first_level(features)?;
        let (batch, _, height, width) = level.dim();
        if proposals.len() != batch {
            return Err(ModelError::stage(
                "refinement",
                format!("{} proposal lists for a batch of {batch}", proposals.len()),
            ));
        }

        let mut detections = Vec::with_capacity(batch);
        for (n, image_proposals) in proposals.iter().enumerate() {
            let mut by_class: BTreeMap<usize, Vec<(Rect, f32)>> = BTreeMap::new();
            for proposal in image_proposals {
                let (cx, cy) = proposal.bbox.center();
                let x = ((cx / self.stride as f32) as usize).min(width - 1);
                let y = ((cy / self.stride as f32) as usize).min(height - 1);
                let (class_id, prob) = self.classify(level.slice(s![n, .., y, x]));
                let score = prob * proposal.objectness;
                if score >= self.test_cfg.score_thr {
                    by_class
                        .entry(class_id)
                        .or_default()
                        .push((proposal.bbox, score));
                }
            }

            let mut image_detections = Vec::new();
            for (class_id, candidates) in by_class {
                let (boxes, scores): (Vec<Rect>, Vec<f32>) = candidates.into_iter().unzip();
                for idx in nms(&boxes, &scores, self.test_cfg.nms_iou_thr) {
                    image_detections.push(RawDetection {
                        bbox: boxes[idx].to_tlbr(),
                        score: scores[idx],
                        class_id,
                    });
                }
            }
            image_detections.sort_by(|a, b| b.score.total_cmp(&a.score));
            detections.push(image_detections);
        }
        debug!(
            detections = detections.iter().map(Vec::len).sum::<usize>(),
            "refinement done"
        );
        Ok(detections)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax_argmax(logits: &[f32]) -> (usize, f32) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut best = (0, f32::NEG_INFINITY);
    let mut total = 0.0;
    for (i, logit) in logits.iter().enumerate() {
        let e = (logit - max).exp();
        total += e;
        if e > best.1 {
            best = (i, e);
        }
    }
    (best.0, best.1 / total)
}

/// Loads [`AnchorPoolDetector`] checkpoints stored as JSON weight files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorPoolLoader;

impl ModelLoader for AnchorPoolLoader {
    type Model = AnchorPoolDetector;

    fn load(&self, config: &DetectorConfig, checkpoint: &Path) -> Result<Self::Model, ModelError> {
        if config.model.kind != "AnchorPoolDetector" {
            return Err(ModelError::Checkpoint(format!(
                "unsupported detector type `{}`",
                config.model.kind
            )));
        }
        let text = std::fs::read_to_string(checkpoint)
            .map_err(|err| ModelError::Checkpoint(format!("{}: {err}", checkpoint.display())))?;
        let weights: AnchorPoolWeights = serde_json::from_str(&text)
            .map_err(|err| ModelError::Checkpoint(format!("{}: {err}", checkpoint.display())))?;
        AnchorPoolDetector::new(weights, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_classes: usize) -> DetectorConfig {
        let mut cfg = DetectorConfig::default();
        cfg.model.num_classes = num_classes;
        cfg.input_channels = 1;
        cfg
    }

    /// Objectness fires on bright cells; class 1 wins on bright cells.
    fn weights() -> AnchorPoolWeights {
        AnchorPoolWeights {
            stride: 4,
            anchor_scale: 2.0,
            objectness: vec![20.0],
            objectness_bias: -10.0,
            class_weights: vec![vec![-5.0], vec![5.0]],
            class_bias: vec![0.0, 0.0],
        }
    }

    #[test]
    fn test_proposal_count_follows_content() {
        let detector = AnchorPoolDetector::new(weights(), &config(2)).unwrap();
        let mut input = Array4::<f32>::zeros((2, 1, 16, 16));
        input.slice_mut(s![0, 0, 0..4, 0..4]).fill(1.0);
        input.slice_mut(s![0, 0, 12..16, 12..16]).fill(1.0);

        let features = detector.extract_features(input.view()).unwrap();
        let proposals = detector.propose(&features).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].len(), 2);
        assert!(proposals[1].is_empty());
        // anchor of side 8 centred on (2, 2), clipped to the image
        assert_eq!(proposals[0][0].bbox.to_tlbr()[..2], [0.0, 0.0]);
    }

    #[test]
    fn test_refine_classifies_and_scores() {
        let detector = AnchorPoolDetector::new(weights(), &config(2)).unwrap();
        let mut input = Array4::<f32>::zeros((1, 1, 16, 16));
        input.slice_mut(s![0, 0, 4..8, 4..8]).fill(1.0);

        let features = detector.extract_features(input.view()).unwrap();
        let proposals = detector.propose(&features).unwrap();
        let detections = detector.refine(&features, &proposals).unwrap();

        assert_eq!(detections[0].len(), 1);
        let det = detections[0][0];
        assert_eq!(det.class_id, 1);
        assert!(det.score > 0.9);
        assert_eq!(det.bbox, [2.0, 2.0, 10.0, 10.0]);
    }

    #[test]
    fn test_weights_must_match_config() {
        let err = AnchorPoolDetector::new(weights(), &config(3)).err().unwrap();
        assert!(matches!(err, ModelError::Checkpoint(_)));
    }

    #[test]
    fn test_softmax_argmax() {
        let (idx, p) = softmax_argmax(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(idx, 0);
        assert!((p - 0.25).abs() < 1e-6);
        let (idx, _) = softmax_argmax(&[1.0, 3.0, 2.0]);
        assert_eq!(idx, 1);
    }
}
