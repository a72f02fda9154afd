//! Reference compilation service running on `ndarray`.

use ndarray::Array4;
use tracing::{debug, warn};

use super::{CompilationService, CompileError, CompileRequest, EngineArtifact, EnginePlan, StateValue};
use crate::adapter::{AdaptedModel, DetectionOutputs};
use crate::context::Precision;

/// Largest finite half-precision value.
const F16_MAX: f32 = 65504.0;

/// Traces the adapted graph at every profile point and emits an
/// [`EnginePlan`] payload.
///
/// The workspace a build needs is the largest `(input + outputs)` footprint
/// over the profile points at the requested precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCompiler;

impl ReferenceCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl CompilationService for ReferenceCompiler {
    fn compile(
        &self,
        graph: &dyn AdaptedModel,
        request: &CompileRequest<'_>,
    ) -> Result<EngineArtifact, CompileError> {
        if request.output_names.len() != graph.output_arity() {
            return Err(CompileError::OutputArity {
                expected: graph.output_arity(),
                got: request.output_names.len(),
            });
        }
        if request.input_names.len() != 1 {
            return Err(CompileError::Unsupported(format!(
                "expected exactly one input name, got {}",
                request.input_names.len()
            )));
        }

        let mut workspace_required = 0u64;
        let mut opt_output_shapes = Vec::new();
        for shape in request.shape_profile.points() {
            let outputs = trace(graph, request, shape)?;
            if request.strict_type_constraints {
                check_representable(&outputs, request.precision)?;
            }
            let elements = (shape.iter().product::<usize>() + outputs.element_count()) as u64;
            workspace_required = workspace_required.max(elements * request.precision.bytes());
            if shape == request.shape_profile.opt() {
                opt_output_shapes = outputs.shapes().to_vec();
            }
        }
        debug!(workspace_required, "traced all profile points");

        if workspace_required > request.max_workspace_size {
            return Err(CompileError::WorkspaceExceeded {
                required: workspace_required,
                limit: request.max_workspace_size,
            });
        }

        let plan = EnginePlan {
            input_names: request.input_names.to_vec(),
            output_names: request.output_names.to_vec(),
            shape_profile: request.shape_profile.clone(),
            precision: request.precision,
            device: request.device,
            strict_type_constraints: request.strict_type_constraints,
            max_workspace_size: request.max_workspace_size,
            workspace_required,
            max_detections: graph.max_detections(),
            opt_output_shapes,
        };

        Ok(EngineArtifact::from_engine(
            plan.encode()?,
            plan.input_names.clone(),
            plan.output_names.clone(),
        )
        .with_entry("min_shape", StateValue::Shape(plan.shape_profile.min().to_vec()))
        .with_entry("opt_shape", StateValue::Shape(plan.shape_profile.opt().to_vec()))
        .with_entry("max_shape", StateValue::Shape(plan.shape_profile.max().to_vec()))
        .with_entry("precision", StateValue::Text(plan.precision.to_string())))
    }
}

fn trace(
    graph: &dyn AdaptedModel,
    request: &CompileRequest<'_>,
    shape: &[usize],
) -> Result<DetectionOutputs, CompileError> {
    let dims: [usize; 4] = shape
        .try_into()
        .map_err(|_| CompileError::Unsupported(format!("input shape {shape:?} is not rank 4")))?;

    let traced = if request.input.shape() == shape {
        graph.forward(request.input)
    } else {
        graph.forward(Array4::<f32>::zeros(dims).view())
    };
    let outputs = traced.map_err(|source| CompileError::Trace {
        shape: shape.to_vec(),
        source,
    })?;

    if outputs.batch_size() != dims[0] {
        return Err(CompileError::Unsupported(format!(
            "graph changed batch size from {} to {}",
            dims[0],
            outputs.batch_size()
        )));
    }
    Ok(outputs)
}

fn check_representable(outputs: &DetectionOutputs, precision: Precision) -> Result<(), CompileError> {
    let limit = match precision {
        Precision::Fp32 => f32::MAX,
        Precision::Fp16 => F16_MAX,
    };
    if let Some(value) = outputs
        .float_values()
        .find(|v| !v.is_finite() || v.abs() > limit)
    {
        warn!(value, %precision, "output value not representable");
        return Err(CompileError::TypeConstraint(format!(
            "output value {value} does not fit {precision}"
        )));
    }
    Ok(())
}
