//! Input shape optimization profiles.

mod resolver;
mod shape_profile;

pub use resolver::ShapeProfileResolver;
pub use shape_profile::{ShapeProfile, parse_shape};
