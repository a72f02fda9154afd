//! Convert two-stage object detectors into shape-optimized inference engines.
//!
//! The conversion runs five stages in order:
//!
//! 1. [`ShapeProfileResolver`] derives the min/opt/max input profile from the
//!    detector configuration unless one is given explicitly.
//! 2. [`TwoStageAdapter`] wraps the detector into a single-input graph with the
//!    fixed outputs `num_detections`, `boxes`, `scores`, `classes`.
//! 3. [`ConversionContext`] binds the target device and precision.
//! 4. [`EngineCompiler`] warms the adapter up once and hands it to a
//!    [`CompilationService`].
//! 5. [`ArtifactPersister`] writes the engine state and the raw engine bytes.
//!
//! # Example
//!
//! ```no_run
//! use det2engine::{ArtifactPersister, AnchorPoolLoader, ConversionRequest, Converter, ReferenceCompiler};
//!
//! # fn main() -> Result<(), det2engine::ConversionError> {
//! let request = ConversionRequest::builder("detector.json", "weights.json")
//!     .fp16(true)
//!     .build();
//! let conversion = Converter::new(ReferenceCompiler::new()).run(&AnchorPoolLoader, &request)?;
//! ArtifactPersister::new(true).save(&conversion.artifact, "detector.state")?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod compiler;
pub mod config;
pub mod context;
pub mod detectors;
pub mod error;
pub mod logging;
pub mod persist;
pub mod pipeline;
pub mod profile;
pub mod rect;
pub mod request;

pub use adapter::{AdaptedModel, DetectionOutputs, SingleStageAdapter, TwoStageAdapter};
pub use compiler::{
    CompilationService, CompileError, CompileRequest, EngineArtifact, EngineCompiler, EnginePlan,
    ReferenceCompiler,
};
pub use config::DetectorConfig;
pub use context::{ConversionContext, Device, Precision};
pub use detectors::{AnchorPoolDetector, AnchorPoolLoader, ModelLoader};
pub use error::{ConversionError, ModelError, Stage};
pub use persist::ArtifactPersister;
pub use pipeline::{Conversion, Converter, LoadedConversion};
pub use profile::{ShapeProfile, ShapeProfileResolver};
pub use request::ConversionRequest;
