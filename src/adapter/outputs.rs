//! Fixed-size detection outputs.

use ndarray::{Array2, Array3};

use super::RawDetection;

/// Semantic slots of the adapted model's outputs, in output order.
pub const OUTPUT_SLOTS: [&str; 4] = ["num_detections", "boxes", "scores", "classes"];

/// Padded outputs of an adapted detector.
///
/// With `B` images and `K` detection slots per image:
/// `num_detections` is `[B, 1]`, `boxes` is `[B, K, 4]` (x1, y1, x2, y2),
/// `scores` and `classes` are `[B, K]`. Slots past `num_detections[b]` are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutputs {
    pub num_detections: Array2<i32>,
    pub boxes: Array3<f32>,
    pub scores: Array2<f32>,
    pub classes: Array2<f32>,
}

impl DetectionOutputs {
    /// Pad or truncate per-image detections into `max_per_img` slots.
    ///
    /// Detections are ranked by descending score before truncation.
    pub fn from_detections(per_image: Vec<Vec<RawDetection>>, max_per_img: usize) -> Self {
        let batch = per_image.len();
        let mut num_detections = Array2::zeros((batch, 1));
        let mut boxes = Array3::zeros((batch, max_per_img, 4));
        let mut scores = Array2::zeros((batch, max_per_img));
        let mut classes = Array2::zeros((batch, max_per_img));

        for (b, mut dets) in per_image.into_iter().enumerate() {
            dets.sort_by(|x, y| y.score.total_cmp(&x.score));
            dets.truncate(max_per_img);
            num_detections[[b, 0]] = dets.len() as i32;
            for (k, det) in dets.iter().enumerate() {
                for (i, v) in det.bbox.iter().enumerate() {
                    boxes[[b, k, i]] = *v;
                }
                scores[[b, k]] = det.score;
                classes[[b, k]] = det.class_id as f32;
            }
        }

        Self {
            num_detections,
            boxes,
            scores,
            classes,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.num_detections.nrows()
    }

    /// Shapes of the output tensors in slot order.
    pub fn shapes(&self) -> [Vec<usize>; 4] {
        [
            self.num_detections.shape().to_vec(),
            self.boxes.shape().to_vec(),
            self.scores.shape().to_vec(),
            self.classes.shape().to_vec(),
        ]
    }

    /// Total number of elements across all output tensors.
    pub fn element_count(&self) -> usize {
        self.num_detections.len() + self.boxes.len() + self.scores.len() + self.classes.len()
    }

    /// All floating-point output values.
    pub fn float_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.boxes
            .iter()
            .chain(self.scores.iter())
            .chain(self.classes.iter())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(score: f32, class_id: usize) -> RawDetection {
        RawDetection {
            bbox: [1.0, 2.0, 3.0, 4.0],
            score,
            class_id,
        }
    }

    #[test]
    fn test_padding() {
        let out = DetectionOutputs::from_detections(vec![vec![det(0.9, 2)], vec![]], 3);

        assert_eq!(out.batch_size(), 2);
        assert_eq!(
            out.shapes(),
            [vec![2, 1], vec![2, 3, 4], vec![2, 3], vec![2, 3]]
        );
        assert_eq!(out.num_detections[[0, 0]], 1);
        assert_eq!(out.num_detections[[1, 0]], 0);
        assert_eq!(out.classes[[0, 0]], 2.0);
        assert_eq!(out.scores[[0, 1]], 0.0);
        assert_eq!(out.boxes[[0, 0, 3]], 4.0);
        assert_eq!(out.element_count(), 2 + 24 + 6 + 6);
    }

    #[test]
    fn test_truncation_keeps_best() {
        let dets = vec![det(0.2, 0), det(0.8, 1), det(0.5, 2)];
        let out = DetectionOutputs::from_detections(vec![dets], 2);

        assert_eq!(out.num_detections[[0, 0]], 2);
        assert_eq!(out.scores[[0, 0]], 0.8);
        assert_eq!(out.scores[[0, 1]], 0.5);
        assert_eq!(out.classes[[0, 1]], 2.0);
    }
}
