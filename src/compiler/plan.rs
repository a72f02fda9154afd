//! Engine payload format written by [`ReferenceCompiler`](super::ReferenceCompiler).
//!
//! Layout: 4-byte magic `DTEN`, little-endian `u32` format version, then the
//! bincode-encoded [`EnginePlan`].

use serde::{Deserialize, Serialize};

use super::CompileError;
use crate::context::{Device, Precision};
use crate::error::{ConversionError, Result};
use crate::profile::ShapeProfile;

pub const ENGINE_MAGIC: &[u8; 4] = b"DTEN";
pub const ENGINE_FORMAT_VERSION: u32 = 1;

/// Build parameters and bindings recorded in an engine payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePlan {
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub shape_profile: ShapeProfile,
    pub precision: Precision,
    pub device: Device,
    pub strict_type_constraints: bool,
    pub max_workspace_size: u64,
    /// Peak workspace observed while tracing the profile points.
    pub workspace_required: u64,
    pub max_detections: usize,
    /// Output shapes at the `opt` profile point, in output order.
    pub opt_output_shapes: Vec<Vec<usize>>,
}

impl EnginePlan {
    pub fn encode(&self) -> std::result::Result<Vec<u8>, CompileError> {
        let body =
            bincode::serialize(self).map_err(|err| CompileError::Serialization(err.to_string()))?;
        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(ENGINE_MAGIC);
        bytes.extend_from_slice(&ENGINE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (magic, rest) = bytes
            .split_first_chunk::<4>()
            .ok_or_else(|| ConversionError::Serialization("engine payload is truncated".into()))?;
        if magic != ENGINE_MAGIC {
            return Err(ConversionError::Serialization(
                "engine payload has an unknown magic".into(),
            ));
        }
        let (version, body) = rest
            .split_first_chunk::<4>()
            .ok_or_else(|| ConversionError::Serialization("engine payload is truncated".into()))?;
        let version = u32::from_le_bytes(*version);
        if version != ENGINE_FORMAT_VERSION {
            return Err(ConversionError::Serialization(format!(
                "unsupported engine format version {version}"
            )));
        }
        Ok(bincode::deserialize(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_foreign_payload() {
        assert!(EnginePlan::decode(b"PLAN\x01\x00\x00\x00").is_err());
        assert!(EnginePlan::decode(b"DT").is_err());
        assert!(EnginePlan::decode(b"DTEN\x09\x00\x00\x00").is_err());
    }
}
