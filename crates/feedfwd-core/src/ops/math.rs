//! Elementwise arithmetic

use std::time::Instant;

use feedfwd_backends::Kernel;

use super::{launch_1d, require_len};
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::Result;
use crate::instrumentation::ExecutionMetrics;

/// In place Hadamard product: `b[k] *= a[k]` for `k < lx`
///
/// `a` and `b` are distinct arrays; the borrow checker rules out passing the
/// same array twice.
#[tracing::instrument(skip(device, a, b), fields(a = %a.handle(), b = %b.handle()))]
pub fn hadamard_multiply(
    device: &Device,
    lx: usize,
    a: &DeviceArray<f32>,
    b: &mut DeviceArray<f32>,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "hadamard_multiply multiplier", a, lx)?;
    require_len(device, "hadamard_multiply operand", b, lx)?;

    let kernel = Kernel::Hadamard {
        len: lx,
        a: a.handle(),
        b: b.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new("hadamard_multiply", lx, start).log();
    Ok(())
}
