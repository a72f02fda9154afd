//! Detector configuration file model.
//!
//! The configuration is a JSON document describing the detector family, its
//! test-time pipeline and its test-time post-processing limits:
//!
//! ```json
//! {
//!   "model": { "type": "AnchorPoolDetector", "num_classes": 80 },
//!   "test_pipeline": [
//!     { "type": "LoadImageFromFile" },
//!     { "type": "MultiScaleFlipAug", "img_scale": [[800, 1333]] }
//!   ],
//!   "test_cfg": { "max_per_img": 100, "score_thr": 0.05 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConversionError, Result};

/// Parsed detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub test_pipeline: Vec<PipelineStep>,
    #[serde(default)]
    pub test_cfg: TestConfig,
    /// Number of image channels the detector expects.
    #[serde(default = "default_input_channels")]
    pub input_channels: usize,
}

fn default_input_channels() -> usize {
    3
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: ModelSection::default(),
            test_pipeline: Vec::new(),
            test_cfg: TestConfig::default(),
            input_channels: default_input_channels(),
        }
    }
}

/// Detector family and head size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub num_classes: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            kind: String::from("AnchorPoolDetector"),
            num_classes: 80,
        }
    }
}

/// One step of the test-time data pipeline. Only `type` is interpreted
/// structurally; every other key is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl PipelineStep {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn img_scale(&self) -> Option<&Value> {
        self.params.get("img_scale")
    }
}

/// Test-time post-processing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Fixed number of detection slots per image in the adapted outputs.
    pub max_per_img: usize,
    pub score_thr: f32,
    pub nms_iou_thr: f32,
    /// Upper bound on proposals kept after the first stage.
    pub rpn_max_proposals: usize,
    pub rpn_score_thr: f32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_per_img: 100,
            score_thr: 0.05,
            nms_iou_thr: 0.5,
            rpn_max_proposals: 1000,
            rpn_score_thr: 0.5,
        }
    }
}

impl DetectorConfig {
    /// Load a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConversionError::Configuration(format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_json_str(&text).map_err(|err| match err {
            ConversionError::Configuration(msg) => {
                ConversionError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| ConversionError::Configuration(err.to_string()))
    }

    /// The raw `img_scale` value of the first test pipeline step declaring one.
    pub fn image_scale(&self) -> Option<&Value> {
        self.test_pipeline.iter().find_map(PipelineStep::img_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_config() {
        let cfg = DetectorConfig::from_json_str(
            r#"{
                "test_pipeline": [
                    {"type": "LoadImageFromFile"},
                    {"type": "MultiScaleFlipAug", "img_scale": [[800, 1333]], "flip": false}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.input_channels, 3);
        assert_eq!(cfg.test_cfg.max_per_img, 100);
        assert_eq!(cfg.model.num_classes, 80);
        assert_eq!(cfg.image_scale(), Some(&json!([[800, 1333]])));
        assert_eq!(cfg.test_pipeline[1].params.get("flip"), Some(&json!(false)));
    }

    #[test]
    fn test_missing_scale() {
        let cfg = DetectorConfig::default();
        assert!(cfg.image_scale().is_none());
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = DetectorConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConversionError::Configuration(_)));
    }
}
