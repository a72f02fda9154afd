//! Three-point (min/opt/max) shape profile.

use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, Result};

/// Shape range a compiled engine is optimized for.
///
/// Every dimension satisfies `min[i] <= opt[i] <= max[i]` and all values are
/// positive. The invariant is checked on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct ShapeProfile {
    min: Vec<usize>,
    opt: Vec<usize>,
    max: Vec<usize>,
}

#[derive(Deserialize)]
struct RawProfile {
    min: Vec<usize>,
    opt: Vec<usize>,
    max: Vec<usize>,
}

impl TryFrom<RawProfile> for ShapeProfile {
    type Error = ConversionError;

    fn try_from(raw: RawProfile) -> Result<Self> {
        ShapeProfile::new(raw.min, raw.opt, raw.max)
    }
}

impl ShapeProfile {
    /// Build a profile, validating rank agreement, positivity and ordering.
    pub fn new(min: Vec<usize>, opt: Vec<usize>, max: Vec<usize>) -> Result<Self> {
        let profile = Self { min, opt, max };
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        if self.min.is_empty() {
            return Err(ConversionError::InvalidShapeProfile(
                "shapes must have at least one dimension".into(),
            ));
        }
        if self.opt.len() != self.min.len() || self.max.len() != self.min.len() {
            return Err(ConversionError::InvalidShapeProfile(format!(
                "rank mismatch: min {:?}, opt {:?}, max {:?}",
                self.min, self.opt, self.max
            )));
        }
        for (name, shape) in [("min", &self.min), ("opt", &self.opt), ("max", &self.max)] {
            if shape.contains(&0) {
                return Err(ConversionError::InvalidShapeProfile(format!(
                    "{name} shape {shape:?} has a non-positive dimension"
                )));
            }
        }
        for i in 0..self.min.len() {
            if !(self.min[i] <= self.opt[i] && self.opt[i] <= self.max[i]) {
                return Err(ConversionError::InvalidShapeProfile(format!(
                    "dimension {i} is not ordered: min {} / opt {} / max {}",
                    self.min[i], self.opt[i], self.max[i]
                )));
            }
        }
        Ok(())
    }

    /// Smallest accepted input shape.
    pub fn min(&self) -> &[usize] {
        &self.min
    }

    /// Shape the engine is tuned for.
    pub fn opt(&self) -> &[usize] {
        &self.opt
    }

    /// Largest accepted input shape.
    pub fn max(&self) -> &[usize] {
        &self.max
    }

    /// Number of dimensions of each profile point.
    pub fn rank(&self) -> usize {
        self.min.len()
    }

    /// The three profile points in min, opt, max order.
    pub fn points(&self) -> [&[usize]; 3] {
        [&self.min, &self.opt, &self.max]
    }

    /// Whether `shape` lies inside the profile range.
    pub fn contains(&self, shape: &[usize]) -> bool {
        shape.len() == self.rank()
            && shape
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(d, (lo, hi))| lo <= d && d <= hi)
    }
}

impl std::fmt::Display for ShapeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min {:?} / opt {:?} / max {:?}",
            self.min, self.opt, self.max
        )
    }
}

/// Parse a shape written as `1x3x800x1333`.
pub fn parse_shape(text: &str) -> Result<Vec<usize>> {
    text.split(['x', 'X', ','])
        .map(|dim| {
            dim.trim().parse::<usize>().map_err(|_| {
                ConversionError::InvalidShapeProfile(format!("cannot parse shape `{text}`"))
            })
        })
        .collect()
}
