//! Derive a shape profile from a detector configuration.

use serde_json::Value;
use tracing::debug;

use super::ShapeProfile;
use crate::config::DetectorConfig;
use crate::error::{ConversionError, Result};

/// Resolves the shape profile used to build an engine.
///
/// An explicit profile wins and is only checked against the adapter's input
/// rank. Otherwise the profile is derived from the single `img_scale` pair
/// declared in the test pipeline.
#[derive(Debug, Clone)]
pub struct ShapeProfileResolver {
    batch: usize,
    input_rank: usize,
}

impl Default for ShapeProfileResolver {
    fn default() -> Self {
        Self {
            batch: 1,
            input_rank: 4,
        }
    }
}

impl ShapeProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        config: &DetectorConfig,
        explicit: Option<&ShapeProfile>,
    ) -> Result<ShapeProfile> {
        if let Some(profile) = explicit {
            if profile.rank() != self.input_rank {
                return Err(ConversionError::InvalidShapeProfile(format!(
                    "expected rank {} shapes, got rank {}",
                    self.input_rank,
                    profile.rank()
                )));
            }
            debug!(%profile, "using explicit shape profile");
            return Ok(profile.clone());
        }

        let scale = config.image_scale().ok_or_else(|| {
            ConversionError::Configuration(
                "test_pipeline declares no img_scale and no shape profile was given".into(),
            )
        })?;
        let (a, b) = scale_pair(scale)?;
        let channels = config.input_channels;
        if channels == 0 {
            return Err(ConversionError::Configuration(
                "input_channels must be positive".into(),
            ));
        }

        let lo = a.min(b);
        let hi = a.max(b);
        let profile = ShapeProfile::new(
            vec![self.batch, channels, lo, lo],
            vec![self.batch, channels, b, a],
            vec![self.batch, channels, hi, hi],
        )?;
        debug!(%profile, "derived shape profile from img_scale");
        Ok(profile)
    }
}

/// Extract the single `(a, b)` pair from `[a, b]` or `[[a, b]]`.
fn scale_pair(value: &Value) -> Result<(usize, usize)> {
    let items = value
        .as_array()
        .ok_or_else(|| ConversionError::Configuration(format!("img_scale {value} is not a list")))?;

    match items.as_slice() {
        [inner @ Value::Array(_)] => scale_pair(inner),
        [a, b] if !a.is_array() && !b.is_array() => Ok((scale_value(a)?, scale_value(b)?)),
        [_, _, ..] if items.iter().all(Value::is_array) => Err(ConversionError::Configuration(
            format!("img_scale declares {} scale pairs; exactly one is supported", items.len()),
        )),
        _ => Err(ConversionError::Configuration(format!(
            "img_scale {value} is not a two-element range"
        ))),
    }
}

fn scale_value(value: &Value) -> Result<usize> {
    value
        .as_u64()
        .filter(|v| *v > 0)
        .map(|v| v as usize)
        .ok_or_else(|| {
            ConversionError::Configuration(format!("img_scale entry {value} is not a positive integer"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineStep;
    use serde_json::json;

    fn config_with_scale(scale: Value) -> DetectorConfig {
        DetectorConfig {
            test_pipeline: vec![
                PipelineStep::new("LoadImageFromFile"),
                PipelineStep::new("MultiScaleFlipAug").with_param("img_scale", scale),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_derive_from_listed_pair() {
        let cfg = config_with_scale(json!([[800, 1333]]));
        let profile = ShapeProfileResolver::new().resolve(&cfg, None).unwrap();

        assert_eq!(profile.min(), &[1, 3, 800, 800]);
        assert_eq!(profile.opt(), &[1, 3, 1333, 800]);
        assert_eq!(profile.max(), &[1, 3, 1333, 1333]);
    }

    #[test]
    fn test_derive_is_order_independent_for_bounds() {
        let resolver = ShapeProfileResolver::new();
        for (a, b) in [(1333usize, 800usize), (800, 1333), (640, 480), (320, 512)] {
            let profile = resolver
                .resolve(&config_with_scale(json!([a, b])), None)
                .unwrap();
            let (lo, hi) = (a.min(b), a.max(b));
            assert_eq!(profile.min(), &[1, 3, lo, lo]);
            assert_eq!(profile.max(), &[1, 3, hi, hi]);
            assert_eq!(profile.opt(), &[1, 3, b, a]);
        }
    }

    #[test]
    fn test_channels_from_config() {
        let mut cfg = config_with_scale(json!([64, 32]));
        cfg.input_channels = 1;
        let profile = ShapeProfileResolver::new().resolve(&cfg, None).unwrap();
        assert_eq!(profile.opt(), &[1, 1, 32, 64]);
    }

    #[test]
    fn test_missing_scale_is_configuration_error() {
        let cfg = DetectorConfig {
            test_pipeline: vec![PipelineStep::new("LoadImageFromFile")],
            ..Default::default()
        };
        let err = ShapeProfileResolver::new().resolve(&cfg, None).unwrap_err();
        assert!(matches!(err, ConversionError::Configuration(_)));
    }

    #[test]
    fn test_multiple_pairs_are_rejected() {
        let cfg = config_with_scale(json!([[800, 1333], [640, 1066]]));
        let err = ShapeProfileResolver::new().resolve(&cfg, None).unwrap_err();
        assert!(matches!(err, ConversionError::Configuration(_)));
    }

    #[test]
    fn test_non_pair_range_is_rejected() {
        for scale in [json!([800]), json!([800, 1333, 2000]), json!(800), json!([0, 800])] {
            let err = ShapeProfileResolver::new()
                .resolve(&config_with_scale(scale), None)
                .unwrap_err();
            assert!(matches!(err, ConversionError::Configuration(_)));
        }
    }

    #[test]
    fn test_explicit_profile_is_used_verbatim() {
        let explicit =
            ShapeProfile::new(vec![1, 3, 320, 320], vec![1, 3, 480, 640], vec![1, 3, 640, 640])
                .unwrap();
        let cfg = config_with_scale(json!([[800, 1333]]));
        let profile = ShapeProfileResolver::new()
            .resolve(&cfg, Some(&explicit))
            .unwrap();
        assert_eq!(profile, explicit);
    }

    #[test]
    fn test_explicit_profile_rank_checked() {
        let explicit = ShapeProfile::new(vec![3, 8, 8], vec![3, 8, 8], vec![3, 8, 8]).unwrap();
        let err = ShapeProfileResolver::new()
            .resolve(&DetectorConfig::default(), Some(&explicit))
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidShapeProfile(_)));
    }
}
