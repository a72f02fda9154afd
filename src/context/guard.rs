use std::cell::RefCell;

use parking_lot::Mutex;
use tracing::debug;

use super::{Device, Precision};
use crate::error::{ConversionError, Result};

/// Devices currently bound by an in-flight conversion in this process.
static HELD_DEVICES: Mutex<Vec<Device>> = Mutex::new(Vec::new());

#[derive(Debug, Clone, Copy)]
struct Binding {
    device: Option<Device>,
    grad_enabled: bool,
    precision: Precision,
}

const UNBOUND: Binding = Binding {
    device: None,
    grad_enabled: true,
    precision: Precision::Fp32,
};

thread_local! {
    static BINDING: RefCell<Binding> = const { RefCell::new(UNBOUND) };
}

/// Device currently bound on this thread, if any.
pub fn active_device() -> Option<Device> {
    BINDING.with(|b| b.borrow().device)
}

/// Whether gradient tracking is enabled on this thread.
pub fn grad_enabled() -> bool {
    BINDING.with(|b| b.borrow().grad_enabled)
}

pub fn active_precision() -> Precision {
    BINDING.with(|b| b.borrow().precision)
}

/// RAII binding of {device, no-grad, precision} for one conversion.
///
/// Dropping the context restores whatever binding was active before it was
/// acquired and releases the device, including on early returns and panics.
#[derive(Debug)]
pub struct ConversionContext {
    device: Device,
    precision: Precision,
    prior: Binding,
}

impl ConversionContext {
    /// Bind `device` and `precision` until the returned context is dropped.
    ///
    /// Fails with [`ConversionError::DeviceUnavailable`] if the device is
    /// already bound by another conversion in this process.
    pub fn acquire(device: Device, precision: Precision) -> Result<Self> {
        {
            let mut held = HELD_DEVICES.lock();
            if held.contains(&device) {
                return Err(ConversionError::DeviceUnavailable(device.to_string()));
            }
            held.push(device);
        }

        let prior = BINDING.with(|b| {
            b.replace(Binding {
                device: Some(device),
                grad_enabled: false,
                precision,
            })
        });
        debug!(%device, %precision, "conversion context acquired");

        Ok(Self {
            device,
            precision,
            prior,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }
}

impl Drop for ConversionContext {
    fn drop(&mut self) {
        BINDING.with(|b| *b.borrow_mut() = self.prior);
        HELD_DEVICES.lock().retain(|d| *d != self.device);
        debug!(device = %self.device, "conversion context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_restore() {
        assert_eq!(active_device(), None);
        assert!(grad_enabled());
        {
            let ctx = ConversionContext::acquire(Device::Cuda(101), Precision::Fp16).unwrap();
            assert_eq!(ctx.device(), Device::Cuda(101));
            assert_eq!(active_device(), Some(Device::Cuda(101)));
            assert_eq!(active_precision(), Precision::Fp16);
            assert!(!grad_enabled());
        }
        assert_eq!(active_device(), None);
        assert_eq!(active_precision(), Precision::Fp32);
        assert!(grad_enabled());
    }

    #[test]
    fn test_device_cannot_be_shared() {
        let first = ConversionContext::acquire(Device::Cuda(102), Precision::Fp32).unwrap();
        let err = ConversionContext::acquire(Device::Cuda(102), Precision::Fp32).unwrap_err();
        assert!(matches!(err, ConversionError::DeviceUnavailable(_)));

        drop(first);
        // sequential reuse after release
        let again = ConversionContext::acquire(Device::Cuda(102), Precision::Fp32);
        assert!(again.is_ok());
    }

    #[test]
    fn test_nested_binding_restores_outer() {
        let _outer = ConversionContext::acquire(Device::Cuda(105), Precision::Fp32).unwrap();
        {
            let _inner = ConversionContext::acquire(Device::Cuda(103), Precision::Fp16).unwrap();
            assert_eq!(active_device(), Some(Device::Cuda(103)));
        }
        assert_eq!(active_device(), Some(Device::Cuda(105)));
        assert!(!grad_enabled());
    }

    #[test]
    fn test_cpu_is_held_like_any_device() {
        let first = ConversionContext::acquire(Device::Cpu, Precision::Fp32).unwrap();
        let second = ConversionContext::acquire(Device::Cpu, Precision::Fp16);
        assert!(matches!(second, Err(ConversionError::DeviceUnavailable(_))));
        // the failed attempt leaves the first binding in place
        assert_eq!(active_device(), Some(Device::Cpu));
        assert_eq!(active_precision(), Precision::Fp32);

        drop(first);
        assert!(ConversionContext::acquire(Device::Cpu, Precision::Fp32).is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing_stage() -> Result<()> {
            let _ctx = ConversionContext::acquire(Device::Cuda(104), Precision::Fp32)?;
            Err(ConversionError::Serialization("boom".into()))
        }

        assert!(failing_stage().is_err());
        assert_eq!(active_device(), None);
        assert!(ConversionContext::acquire(Device::Cuda(104), Precision::Fp32).is_ok());
    }
}
