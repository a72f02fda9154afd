//! End-to-end conversion: resolve, adapt, bind, compile.

use std::time::Duration;

use tracing::info;

use crate::adapter::{AdaptedModel, TwoStageAdapter, TwoStageDetector};
use crate::compiler::{CompilationService, EngineArtifact, EngineCompiler};
use crate::config::DetectorConfig;
use crate::context::ConversionContext;
use crate::detectors::ModelLoader;
use crate::error::{ConversionError, Result};
use crate::profile::{ShapeProfile, ShapeProfileResolver};
use crate::request::ConversionRequest;

/// Result of a conversion.
pub struct Conversion<A> {
    pub artifact: EngineArtifact,
    pub shape_profile: ShapeProfile,
    /// Time spent in the compilation service.
    pub elapsed: Duration,
    /// The adapter that was compiled, when the request asked for it.
    pub adapter: Option<A>,
}

/// Result of [`Converter::run`].
///
/// The loader-driven run owns the model it loaded, so instead of a borrowed
/// adapter it keeps the model itself when the request asked for the adapter.
pub struct LoadedConversion<M> {
    pub artifact: EngineArtifact,
    pub shape_profile: ShapeProfile,
    pub elapsed: Duration,
    model: Option<M>,
    max_per_img: usize,
}

impl<M> std::fmt::Debug for LoadedConversion<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedConversion")
            .field("artifact", &self.artifact)
            .field("shape_profile", &self.shape_profile)
            .field("elapsed", &self.elapsed)
            .field("has_model", &self.model.is_some())
            .field("max_per_img", &self.max_per_img)
            .finish()
    }
}

impl<M: TwoStageDetector> LoadedConversion<M> {
    /// Adapter over the loaded model, identical to the one that was compiled.
    ///
    /// `None` unless the request set `return_adapter`.
    pub fn adapter(&self) -> Option<TwoStageAdapter<'_, M>> {
        self.model
            .as_ref()
            .map(|model| TwoStageAdapter::new(model, self.max_per_img))
    }

    pub fn into_model(self) -> Option<M> {
        self.model
    }
}

/// Runs the conversion stages in order around a compilation service.
pub struct Converter<S: CompilationService> {
    resolver: ShapeProfileResolver,
    compiler: EngineCompiler<S>,
}

impl<S: CompilationService> Converter<S> {
    pub fn new(service: S) -> Self {
        Self {
            resolver: ShapeProfileResolver::new(),
            compiler: EngineCompiler::new(service),
        }
    }

    pub fn compiler(&self) -> &EngineCompiler<S> {
        &self.compiler
    }

    /// Convert an already-loaded two-stage detector.
    pub fn convert<'m, D: TwoStageDetector>(
        &self,
        model: &'m D,
        config: &DetectorConfig,
        request: &ConversionRequest,
    ) -> Result<Conversion<TwoStageAdapter<'m, D>>> {
        let profile = self.resolver.resolve(config, request.shape_profile())?;
        let adapter = TwoStageAdapter::new(model, config.test_cfg.max_per_img);
        self.convert_adapted(adapter, profile, request)
    }

    /// Compile any adapter against a resolved profile.
    pub fn convert_adapted<A: AdaptedModel>(
        &self,
        adapter: A,
        profile: ShapeProfile,
        request: &ConversionRequest,
    ) -> Result<Conversion<A>> {
        let compiled = {
            let context = ConversionContext::acquire(request.device(), request.precision())?;
            self.compiler
                .compile(&context, &adapter, &profile, &request.compile_options())?
        };

        Ok(Conversion {
            artifact: compiled.artifact,
            shape_profile: profile,
            elapsed: compiled.elapsed,
            adapter: request.return_adapter().then_some(adapter),
        })
    }

    /// Load the configuration and checkpoint named by `request` and convert.
    ///
    /// The shape profile is resolved before the model is loaded, so an
    /// invalid profile fails without touching the checkpoint or the device.
    pub fn run<L: ModelLoader>(
        &self,
        loader: &L,
        request: &ConversionRequest,
    ) -> Result<LoadedConversion<L::Model>> {
        info!(config = %request.config().display(), "load model from config");
        let config = DetectorConfig::from_path(request.config())?;
        let profile = self.resolver.resolve(&config, request.shape_profile())?;

        let model = loader
            .load(&config, request.checkpoint())
            .map_err(ConversionError::ModelLoad)?;
        let max_per_img = config.test_cfg.max_per_img;

        let Conversion {
            artifact,
            shape_profile,
            elapsed,
            ..
        } = self.convert_adapted(TwoStageAdapter::new(&model, max_per_img), profile, request)?;

        Ok(LoadedConversion {
            artifact,
            shape_profile,
            elapsed,
            model: request.return_adapter().then_some(model),
            max_per_img,
        })
    }
}
