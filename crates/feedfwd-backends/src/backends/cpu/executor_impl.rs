//! Kernel and sgemm execution for the CPU backend
//!
//! A launch is split the way a GPU grid is: output elements are chunked per
//! block, and each block's chunk is split per lane. Both levels run on rayon.
//! Lanes past the end of the output simply do not exist, which gives the
//! `idx >= len` no-op for free.

use feedfwd_tracing::perf_span;
use rayon::prelude::*;

use super::memory::MemoryManager;
use crate::backend::{DeviceProperties, ExecutionContext, GemmParams, Kernel, LaunchConfig};
use crate::error::{BackendError, Result};

// ================================================================================================
// Kernels
// ================================================================================================

pub(super) fn launch(
    memory: &mut MemoryManager,
    kernel: &Kernel,
    config: &LaunchConfig,
    properties: &DeviceProperties,
) -> Result<()> {
    let _span = perf_span!(
        "cpu_launch",
        kernel = kernel.name(),
        tasks = kernel.task_count(),
        grid_size = config.grid.x,
        block_size = config.block.x
    );

    config.validate(kernel.task_count(), properties)?;

    if let Some(handle) = kernel.aliased_input() {
        return Err(BackendError::AliasedBuffers {
            kernel: kernel.name(),
            handle: handle.id(),
        });
    }

    let len = kernel.output_len();
    if len == 0 {
        return Ok(());
    }

    let mut output = memory.take(kernel.output(), len)?;
    let result = run_kernel(memory, kernel, config, &mut output.words[..len]);
    memory.restore(kernel.output(), output);
    result
}

fn run_kernel(memory: &MemoryManager, kernel: &Kernel, config: &LaunchConfig, out: &mut [f32]) -> Result<()> {
    let len = out.len();

    match *kernel {
        Kernel::SetConstVal { value, .. } => {
            for_each_task(config, out, 1, |_, slot| slot[0] = value);
        }
        Kernel::CostXent { y_hat, y, .. } => {
            let y_hat = memory.words(y_hat, len)?;
            let y = memory.words(y, len)?;
            for_each_task(config, out, 1, |idx, slot| slot[0] = xent_cost(y_hat[idx], y[idx]));
        }
        Kernel::DeltaXent { y_hat, y, .. } => {
            let y_hat = memory.words(y_hat, len)?;
            let y = memory.words(y, len)?;
            for_each_task(config, out, 1, |idx, slot| slot[0] = xent_delta(y_hat[idx], y[idx]));
        }
        Kernel::Hadamard { a, .. } => {
            let a = memory.words(a, len)?;
            for_each_task(config, out, 1, |idx, slot| slot[0] *= a[idx]);
        }
        Kernel::Unary { op, input, .. } => {
            let input = memory.words(input, len)?;
            for_each_task(config, out, 1, |idx, slot| slot[0] = op.apply(input[idx]));
        }
        Kernel::SoftmaxColumns { rows, input, .. } => {
            let input = memory.words(input, len)?;
            for_each_task(config, out, rows, |col, slot| {
                softmax_column(&input[col * rows..(col + 1) * rows], slot)
            });
        }
    }

    Ok(())
}

/// Run `task(global_index, output_slot)` for every task covered by `out`
fn for_each_task<F>(config: &LaunchConfig, out: &mut [f32], elements_per_task: usize, task: F)
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    let block_dim = config.block.x;
    let block_span = elements_per_task * block_dim as usize;

    out.par_chunks_mut(block_span)
        .enumerate()
        .for_each(|(block_idx, block)| {
            block
                .par_chunks_mut(elements_per_task)
                .enumerate()
                .for_each(|(lane_idx, slot)| {
                    let ctx = ExecutionContext::new(block_idx as u32, lane_idx as u32, block_dim);
                    task(ctx.global_index(), slot);
                });
        });
}

#[inline]
fn xent_cost(y_hat: f32, y: f32) -> f32 {
    -(y * y_hat.ln() + (1.0 - y) * (1.0 - y_hat).ln())
}

#[inline]
fn xent_delta(y_hat: f32, y: f32) -> f32 {
    (y_hat - y) / (y_hat * (1.0 - y_hat))
}

fn softmax_column(column: &[f32], out: &mut [f32]) {
    let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for (dst, &x) in out.iter_mut().zip(column) {
        *dst = (x - max).exp();
        sum += *dst;
    }
    for dst in out.iter_mut() {
        *dst /= sum;
    }
}

// ================================================================================================
// Dense linear algebra
// ================================================================================================

pub(super) fn gemm(memory: &mut MemoryManager, params: &GemmParams) -> Result<()> {
    let _span = perf_span!("cpu_sgemm", m = params.m, n = params.n, k = params.k);

    if !params.leading_dims_valid() {
        return Err(BackendError::invalid_launch(format!(
            "sgemm leading dimensions lda={} ldb={} ldc={} too small for m={} k={}",
            params.lda, params.ldb, params.ldc, params.m, params.k
        )));
    }
    if params.c == params.a || params.c == params.b {
        return Err(BackendError::AliasedBuffers {
            kernel: "sgemm",
            handle: params.c.id(),
        });
    }

    let c_len = params.required_c();
    if c_len == 0 {
        return Ok(());
    }

    let mut c = memory.take(params.c, c_len)?;
    let result = gemm_into(memory, params, &mut c.words[..c_len]);
    memory.restore(params.c, c);
    result
}

/// One column of C per rayon task; each element accumulates over `k` in order.
fn gemm_into(memory: &MemoryManager, params: &GemmParams, c: &mut [f32]) -> Result<()> {
    let a = memory.words(params.a, params.required_a())?;
    let b = memory.words(params.b, params.required_b())?;
    let GemmParams {
        m,
        k,
        alpha,
        lda,
        ldb,
        beta,
        ldc,
        ..
    } = *params;

    c.par_chunks_mut(ldc).enumerate().for_each(|(j, column)| {
        for (i, dst) in column.iter_mut().take(m).enumerate() {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a[i + p * lda] * b[p + j * ldb];
            }
            *dst = if beta == 0.0 { alpha * acc } else { alpha * acc + beta * *dst };
        }
    });

    Ok(())
}
