//! Scoped device and precision binding for a conversion.

mod device;
mod guard;

pub use device::{Device, Precision};
pub use guard::{ConversionContext, active_device, active_precision, grad_enabled};
