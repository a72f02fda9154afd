use ndarray::ArrayView4;

use super::{CompileError, EngineArtifact};
use crate::adapter::AdaptedModel;
use crate::context::{Device, Precision};
use crate::profile::ShapeProfile;

/// Everything a compilation service receives besides the graph itself.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    /// Representative input the graph was warmed up with (`opt` shape).
    pub input: ArrayView4<'a, f32>,
    pub shape_profile: &'a ShapeProfile,
    pub precision: Precision,
    pub max_workspace_size: u64,
    /// Disallow silent type promotion inside the engine.
    pub strict_type_constraints: bool,
    pub input_names: &'a [String],
    /// Names of the engine's exit points, in output order.
    pub output_names: &'a [String],
    pub device: Device,
}

/// External graph compiler.
///
/// Implementations trace `graph`, optimize it for the profile range and
/// return the engine's full state. Kernel selection and fusion are entirely
/// the service's business.
pub trait CompilationService {
    fn compile(
        &self,
        graph: &dyn AdaptedModel,
        request: &CompileRequest<'_>,
    ) -> Result<EngineArtifact, CompileError>;
}

impl<S: CompilationService + ?Sized> CompilationService for &S {
    fn compile(
        &self,
        graph: &dyn AdaptedModel,
        request: &CompileRequest<'_>,
    ) -> Result<EngineArtifact, CompileError> {
        (**self).compile(graph, request)
    }
}

impl<S: CompilationService + ?Sized> CompilationService for Box<S> {
    fn compile(
        &self,
        graph: &dyn AdaptedModel,
        request: &CompileRequest<'_>,
    ) -> Result<EngineArtifact, CompileError> {
        (**self).compile(graph, request)
    }
}
