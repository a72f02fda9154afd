//! Warm-up then compile.

use std::time::{Duration, Instant};

use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{CompilationService, CompileRequest, EngineArtifact};
use crate::adapter::{AdaptedModel, DetectionOutputs};
use crate::context::ConversionContext;
use crate::error::{ConversionError, ModelError, Result};
use crate::profile::ShapeProfile;

/// Build limits and binding names forwarded to the compilation service.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub max_workspace_size: u64,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    /// Seed of the random warm-up input.
    pub seed: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_workspace_size: 1 << 25,
            input_names: vec![String::from("input")],
            output_names: crate::adapter::OUTPUT_SLOTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed: 0,
        }
    }
}

/// Output of a successful build.
#[derive(Debug, Clone)]
pub struct CompiledEngine {
    pub artifact: EngineArtifact,
    /// Wall-clock time spent inside the compilation service.
    pub elapsed: Duration,
}

/// Validates an adapter with one warm-up pass, then hands it to a
/// [`CompilationService`].
pub struct EngineCompiler<S: CompilationService> {
    service: S,
}

impl<S: CompilationService> EngineCompiler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Uniform `[0, 1)` tensor with the `opt` shape of `profile`.
    pub fn dummy_input(profile: &ShapeProfile, seed: u64) -> Result<Array4<f32>> {
        let dims: [usize; 4] = profile.opt().try_into().map_err(|_| {
            ConversionError::WarmupFailed(ModelError::InvalidInput {
                expected: "rank 4 opt shape".into(),
                got: profile.opt().to_vec(),
            })
        })?;
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Array4::from_shape_simple_fn(dims, || rng.gen_range(0.0f32..1.0)))
    }

    /// Run the adapter once on `input`.
    pub fn warmup<A: AdaptedModel + ?Sized>(
        &self,
        adapter: &A,
        input: &Array4<f32>,
    ) -> Result<DetectionOutputs> {
        info!(shape = ?input.shape(), "model warmup");
        let outputs = adapter
            .forward(input.view())
            .map_err(ConversionError::WarmupFailed)?;
        debug!(shapes = ?outputs.shapes(), "warmup outputs");
        Ok(outputs)
    }

    /// Warm up `adapter` on the profile's `opt` shape and compile it.
    ///
    /// The compilation service is never invoked when the warm-up fails.
    pub fn compile<A: AdaptedModel>(
        &self,
        context: &ConversionContext,
        adapter: &A,
        profile: &ShapeProfile,
        options: &CompileOptions,
    ) -> Result<CompiledEngine> {
        let input = Self::dummy_input(profile, options.seed)?;
        self.warmup(adapter, &input)?;

        let request = CompileRequest {
            input: input.view(),
            shape_profile: profile,
            precision: context.precision(),
            max_workspace_size: options.max_workspace_size,
            strict_type_constraints: true,
            input_names: &options.input_names,
            output_names: &options.output_names,
            device: context.device(),
        };

        info!(
            device = %request.device,
            precision = %request.precision,
            workspace = request.max_workspace_size,
            "convert model"
        );
        let start = Instant::now();
        let artifact = self
            .service
            .compile(adapter, &request)
            .map_err(ConversionError::CompilationFailed)?;
        let elapsed = start.elapsed();
        info!(elapsed_s = elapsed.as_secs_f64(), "conversion finished");

        Ok(CompiledEngine { artifact, elapsed })
    }
}
