//! Detector families and the loading seam used by the converter.

mod anchor_pool;
mod backbone;

pub use anchor_pool::{AnchorPoolDetector, AnchorPoolLoader, AnchorPoolWeights};
pub use backbone::AvgPoolBackbone;

use std::path::Path;

use crate::adapter::TwoStageDetector;
use crate::config::DetectorConfig;
use crate::error::ModelError;

/// Builds a detector from a configuration and a checkpoint locator.
pub trait ModelLoader {
    type Model: TwoStageDetector;

    fn load(&self, config: &DetectorConfig, checkpoint: &Path) -> Result<Self::Model, ModelError>;
}
