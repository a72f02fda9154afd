//! Error types for the conversion pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CompileError;

/// Failure raised by a detector or by an adapter wrapping one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Input tensor has the wrong rank or channel count.
    #[error("invalid input shape: expected {expected}, got {got:?}")]
    InvalidInput { expected: String, got: Vec<usize> },

    /// A stage of the detector failed while running.
    #[error("{stage} stage failed: {reason}")]
    Stage { stage: &'static str, reason: String },

    /// Checkpoint could not be read or does not match the configuration.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl ModelError {
    pub fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            reason: reason.into(),
        }
    }
}

/// Pipeline stage that produced a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Adapt,
    Context,
    Warmup,
    Compile,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Adapt => "adapt",
            Self::Context => "context",
            Self::Warmup => "warmup",
            Self::Compile => "compile",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Top-level error for a conversion run.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// No shape profile could be derived from the configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An explicit shape profile breaks positivity, rank or ordering.
    #[error("invalid shape profile: {0}")]
    InvalidShapeProfile(String),

    /// The target device is already bound by another conversion.
    #[error("device {0} is already in use by another conversion")]
    DeviceUnavailable(String),

    /// The model loader could not produce a detector.
    #[error("failed to load model: {0}")]
    ModelLoad(#[source] ModelError),

    /// The adapted model could not run on the representative input.
    #[error("warm-up failed: {0}")]
    WarmupFailed(#[source] ModelError),

    /// The compilation service rejected the graph or its constraints.
    #[error("compilation failed: {0}")]
    CompilationFailed(#[source] CompileError),

    /// Raw engine persistence was requested but the state has no engine entry.
    #[error("engine state has no `{key}` entry")]
    MissingEngineData { key: String },

    /// The raw engine file would land on the full-state file.
    #[error("engine file would overwrite the state file {}", path.display())]
    EnginePathConflict { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ConversionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The pipeline stage this error originated from.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) | Self::InvalidShapeProfile(_) => Stage::Resolve,
            Self::ModelLoad(_) => Stage::Adapt,
            Self::DeviceUnavailable(_) => Stage::Context,
            Self::WarmupFailed(_) => Stage::Warmup,
            Self::CompilationFailed(_) => Stage::Compile,
            Self::MissingEngineData { .. }
            | Self::EnginePathConflict { .. }
            | Self::Io { .. }
            | Self::Serialization(_) => Stage::Persist,
        }
    }
}

impl From<bincode::Error> for ConversionError {
    fn from(err: bincode::Error) -> Self {
        ConversionError::Serialization(err.to_string())
    }
}

/// Specialized Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConversionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution() {
        assert_eq!(
            ConversionError::InvalidShapeProfile("x".into()).stage(),
            Stage::Resolve
        );
        assert_eq!(
            ConversionError::WarmupFailed(ModelError::stage("proposal", "boom")).stage(),
            Stage::Warmup
        );
        assert_eq!(
            ConversionError::MissingEngineData {
                key: "engine".into()
            }
            .stage(),
            Stage::Persist
        );
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::InvalidInput {
            expected: "rank 4".into(),
            got: vec![3, 800],
        };
        assert_eq!(
            err.to_string(),
            "invalid input shape: expected rank 4, got [3, 800]"
        );
    }
}
