//! Conversion request and its builder.

use std::path::{Path, PathBuf};

use crate::adapter::OUTPUT_SLOTS;
use crate::compiler::CompileOptions;
use crate::context::{Device, Precision};
use crate::profile::ShapeProfile;

/// Default workspace limit for engine building (32 MiB).
pub const DEFAULT_WORKSPACE_SIZE: u64 = 1 << 25;

/// Parameters of one conversion. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    config: PathBuf,
    checkpoint: PathBuf,
    device: Device,
    precision: Precision,
    max_workspace_size: u64,
    shape_profile: Option<ShapeProfile>,
    return_adapter: bool,
    input_names: Vec<String>,
    output_names: Vec<String>,
    seed: u64,
}

impl ConversionRequest {
    /// Start a request for the given configuration and checkpoint files.
    pub fn builder(
        config: impl Into<PathBuf>,
        checkpoint: impl Into<PathBuf>,
    ) -> ConversionRequestBuilder {
        ConversionRequestBuilder::new(config, checkpoint)
    }

    /// Path of the detector configuration file.
    pub fn config(&self) -> &Path {
        &self.config
    }

    /// Path of the checkpoint file.
    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }

    /// Target device of the engine.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Numeric precision of the engine.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Workspace limit in bytes.
    pub fn max_workspace_size(&self) -> u64 {
        self.max_workspace_size
    }

    /// Explicit shape profile, if any. Otherwise the profile is derived from the configuration.
    pub fn shape_profile(&self) -> Option<&ShapeProfile> {
        self.shape_profile.as_ref()
    }

    /// Whether the adapted model is returned alongside the artifact.
    pub fn return_adapter(&self) -> bool {
        self.return_adapter
    }

    /// Engine output names, in output order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Compilation options derived from this request.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            max_workspace_size: self.max_workspace_size,
            input_names: self.input_names.clone(),
            output_names: self.output_names.clone(),
            seed: self.seed,
        }
    }
}

/// Builder for [`ConversionRequest`].
#[derive(Debug, Clone)]
pub struct ConversionRequestBuilder {
    request: ConversionRequest,
}

impl ConversionRequestBuilder {
    pub fn new(config: impl Into<PathBuf>, checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            request: ConversionRequest {
                config: config.into(),
                checkpoint: checkpoint.into(),
                device: Device::default(),
                precision: Precision::default(),
                max_workspace_size: DEFAULT_WORKSPACE_SIZE,
                shape_profile: None,
                return_adapter: false,
                input_names: vec![String::from("input")],
                output_names: OUTPUT_SLOTS.iter().map(|s| s.to_string()).collect(),
                seed: 0,
            },
        }
    }

    pub fn device(mut self, device: Device) -> Self {
        self.request.device = device;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.request.precision = precision;
        self
    }

    /// Shorthand for `precision(Precision::Fp16)` when `fp16` is set.
    pub fn fp16(self, fp16: bool) -> Self {
        self.precision(Precision::from_fp16_flag(fp16))
    }

    /// Workspace limit in bytes. Defaults to [`DEFAULT_WORKSPACE_SIZE`].
    pub fn max_workspace_size(mut self, bytes: u64) -> Self {
        self.request.max_workspace_size = bytes;
        self
    }

    /// Use `profile` instead of deriving one from the configuration.
    pub fn shape_profile(mut self, profile: ShapeProfile) -> Self {
        self.request.shape_profile = Some(profile);
        self
    }

    /// Also hand back the adapted model.
    pub fn return_adapter(mut self, yes: bool) -> Self {
        self.request.return_adapter = yes;
        self
    }

    pub fn input_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.request.input_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.request.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Seed of the random warm-up input.
    pub fn seed(mut self, seed: u64) -> Self {
        self.request.seed = seed;
        self
    }

    pub fn build(self) -> ConversionRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = ConversionRequest::builder("cfg.json", "ckpt.json").build();

        assert_eq!(request.device(), Device::Cuda(0));
        assert_eq!(request.precision(), Precision::Fp32);
        assert_eq!(request.max_workspace_size(), 1 << 25);
        assert!(request.shape_profile().is_none());
        assert!(!request.return_adapter());
        assert_eq!(
            request.output_names(),
            &["num_detections", "boxes", "scores", "classes"]
        );
    }

    #[test]
    fn test_builder_overrides() {
        let request = ConversionRequest::builder("cfg.json", "ckpt.json")
            .device(Device::Cpu)
            .fp16(true)
            .max_workspace_size(1 << 30)
            .output_names(["dets", "b", "s", "c"])
            .seed(3)
            .build();

        let options = request.compile_options();
        assert_eq!(request.precision(), Precision::Fp16);
        assert_eq!(options.max_workspace_size, 1 << 30);
        assert_eq!(options.output_names, vec!["dets", "b", "s", "c"]);
        assert_eq!(options.input_names, vec!["input"]);
        assert_eq!(options.seed, 3);
    }
}
