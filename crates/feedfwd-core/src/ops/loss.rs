//! Cross-entropy loss kernels
//!
//! Both kernels work elementwise over the `n_out x m` output matrix. Values of
//! `y_hat` at exactly 0 or 1 are not clamped: the cost becomes `inf` or `NaN`
//! and the gradient seed divides by zero. Callers that need finite values
//! must keep predictions strictly inside (0, 1).

use std::time::Instant;

use feedfwd_backends::Kernel;

use super::{launch_1d, require_len};
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::Result;
use crate::instrumentation::ExecutionMetrics;

/// Per-element cross-entropy: `out[k] = -(y[k] ln y_hat[k] + (1 - y[k]) ln(1 - y_hat[k]))`
///
/// The mean cost is the sum of `out` divided by the batch size; see
/// [`crate::Network::cost`].
#[tracing::instrument(skip(device, y_hat, y, out))]
pub fn cost_xent(
    device: &Device,
    lx: usize,
    y_hat: &DeviceArray<f32>,
    y: &DeviceArray<f32>,
    out: &mut DeviceArray<f32>,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "cost_xent prediction", y_hat, lx)?;
    require_len(device, "cost_xent labels", y, lx)?;
    require_len(device, "cost_xent output", out, lx)?;

    let kernel = Kernel::CostXent {
        len: lx,
        y_hat: y_hat.handle(),
        y: y.handle(),
        out: out.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new("cost_xent", lx, start).log();
    Ok(())
}

/// Gradient seed of cross-entropy w.r.t. the prediction:
/// `out[k] = (y_hat[k] - y[k]) / (y_hat[k] (1 - y_hat[k]))`
#[tracing::instrument(skip(device, y_hat, y, out))]
pub fn delta_xent(
    device: &Device,
    lx: usize,
    y_hat: &DeviceArray<f32>,
    y: &DeviceArray<f32>,
    out: &mut DeviceArray<f32>,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "delta_xent prediction", y_hat, lx)?;
    require_len(device, "delta_xent labels", y, lx)?;
    require_len(device, "delta_xent output", out, lx)?;

    let kernel = Kernel::DeltaXent {
        len: lx,
        y_hat: y_hat.handle(),
        y: y.handle(),
        out: out.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new("delta_xent", lx, start).log();
    Ok(())
}
