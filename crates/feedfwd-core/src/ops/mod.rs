//! Kernel wrappers
//!
//! Free functions over typed device arrays plus an explicit length. Each one
//! checks host-visible preconditions (array lengths, 1-D capacity, block
//! size) before anything is launched, then hands a [`Kernel`] to the backend.
//!
//! - [`memory`] - `set_const_val`
//! - [`loss`] - cross-entropy cost and gradient seed
//! - [`math`] - Hadamard product
//! - [`activation`] - elementwise activations and column softmax
//! - [`linalg`] - column-major sgemm

pub mod activation;
pub mod linalg;
pub mod loss;
pub mod math;
pub mod memory;

use feedfwd_backends::Kernel;

use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::{Error, Result};

/// Size and launch a kernel over its task count; zero tasks launch nothing.
pub(crate) fn launch_1d(device: &Device, kernel: &Kernel, block_size: u32) -> Result<()> {
    match device.launch_config_1d(kernel.task_count(), block_size)? {
        Some(config) => device.launch(kernel, &config),
        None => Ok(()),
    }
}

/// Fail unless `array` lives on `device` and holds at least `required` elements.
pub(crate) fn require_len(device: &Device, what: &str, array: &DeviceArray<f32>, required: usize) -> Result<()> {
    if !array.is_on(device) {
        return Err(Error::InvalidLaunch(format!("{what} belongs to another device")));
    }
    if array.len() < required {
        return Err(Error::shape(what, required, array.len()));
    }
    Ok(())
}
