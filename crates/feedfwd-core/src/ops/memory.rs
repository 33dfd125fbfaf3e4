//! Memory operations

use std::time::Instant;

use feedfwd_backends::Kernel;

use super::{launch_1d, require_len};
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::Result;
use crate::instrumentation::ExecutionMetrics;

/// Set `out[0..lx)` to `const_val`
///
/// Elements past `lx` are untouched. Fails with `CapacityExceeded` when
/// `ceil(lx / block_size)` blocks exceed the device's grid limit.
///
/// # Example
///
/// ```
/// use feedfwd_core::{ops, Device};
///
/// let device = Device::new()?;
/// let mut ones = device.allocate::<f32>(300)?;
/// ops::memory::set_const_val(&device, 300, 1.0, &mut ones, 256)?;
/// assert!(ones.to_vec()?.iter().all(|&v| v == 1.0));
/// # Ok::<(), feedfwd_core::Error>(())
/// ```
#[tracing::instrument(skip(device, out), fields(handle = %out.handle()))]
pub fn set_const_val(
    device: &Device,
    lx: usize,
    const_val: f32,
    out: &mut DeviceArray<f32>,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "set_const_val output", out, lx)?;

    let kernel = Kernel::SetConstVal {
        len: lx,
        value: const_val,
        out: out.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new("set_const_val", lx, start).log();
    Ok(())
}
