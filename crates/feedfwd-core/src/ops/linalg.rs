//! Dense linear algebra
//!
//! Matrices are column-major and packed: leading dimension equals the row
//! count.

use std::time::Instant;

use feedfwd_backends::GemmParams;

use super::require_len;
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::{element_count, Result};
use crate::instrumentation::ExecutionMetrics;

/// `C = alpha * A * B + beta * C` with `A: m x k`, `B: k x n`, `C: m x n`
///
/// With `beta == 0` the previous contents of `C` are ignored.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(device, a, b, c), fields(a = %a.handle(), b = %b.handle(), c = %c.handle()))]
pub fn gemm(
    device: &Device,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &DeviceArray<f32>,
    b: &DeviceArray<f32>,
    beta: f32,
    c: &mut DeviceArray<f32>,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "gemm A", a, element_count("gemm A", m, k, a.len())?)?;
    require_len(device, "gemm B", b, element_count("gemm B", k, n, b.len())?)?;
    let c_len = element_count("gemm C", m, n, c.len())?;
    require_len(device, "gemm C", c, c_len)?;

    let params = GemmParams {
        m,
        n,
        k,
        alpha,
        a: a.handle(),
        lda: m.max(1),
        b: b.handle(),
        ldb: k.max(1),
        beta,
        c: c.handle(),
        ldc: m.max(1),
    };
    device.gemm(&params)?;

    ExecutionMetrics::new("gemm", c_len.saturating_mul(k), start).log();
    Ok(())
}
