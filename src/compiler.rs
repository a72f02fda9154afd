//! Warm-up, compilation and the compilation service seam.

mod artifact;
mod engine_compiler;
mod plan;
mod reference;
mod service;

pub use artifact::{ENGINE_KEY, EngineArtifact, StateValue};
pub use engine_compiler::{CompileOptions, CompiledEngine, EngineCompiler};
pub use plan::{ENGINE_FORMAT_VERSION, ENGINE_MAGIC, EnginePlan};
pub use reference::ReferenceCompiler;
pub use service::{CompilationService, CompileRequest};

use thiserror::Error;

use crate::error::ModelError;

/// Failure reported by a [`CompilationService`].
#[derive(Error, Debug)]
pub enum CompileError {
    /// Output names do not match the graph's output count.
    #[error("graph has {expected} outputs but {got} output names were given")]
    OutputArity { expected: usize, got: usize },

    /// The graph could not be traced at one of the profile points.
    #[error("tracing failed at input shape {shape:?}: {source}")]
    Trace {
        shape: Vec<usize>,
        #[source]
        source: ModelError,
    },

    #[error("engine needs {required} bytes of workspace, limit is {limit}")]
    WorkspaceExceeded { required: u64, limit: u64 },

    /// A value cannot be represented in the requested precision without promotion.
    #[error("strict type constraints violated: {0}")]
    TypeConstraint(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported graph: {0}")]
    Unsupported(String),

    #[error("engine serialization failed: {0}")]
    Serialization(String),
}
