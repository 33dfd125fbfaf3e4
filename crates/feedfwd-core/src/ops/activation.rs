//! Activation kernels
//!
//! Elementwise maps (identity, sigmoid, tanh, arctan, ReLU) launch one task
//! per element. Softmax normalises each column of a column-major
//! `rows x cols` matrix and launches one task per column.
//!
//! # Example
//!
//! ```
//! use feedfwd_core::{ops, Activation, Device};
//!
//! let device = Device::new()?;
//! let z = device.upload(&[0.0f32, 1.0, 0.0, 1.0])?;
//! let mut a = device.allocate::<f32>(4)?;
//! ops::activation::apply(&device, Activation::Softmax, &z, &mut a, 2, 2, 256)?;
//! let a = a.to_vec()?;
//! assert!((a[0] + a[1] - 1.0).abs() < 1e-6);
//! # Ok::<(), feedfwd_core::Error>(())
//! ```

use std::time::Instant;

use feedfwd_backends::{Kernel, UnaryOp};

use super::{launch_1d, require_len};
use crate::activation::Activation;
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::{element_count, Result};
use crate::instrumentation::ExecutionMetrics;

fn elementwise(
    device: &Device,
    op: UnaryOp,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    require_len(device, "activation input", input, n)?;
    require_len(device, "activation output", output, n)?;

    let kernel = Kernel::Unary {
        op,
        len: n,
        input: input.handle(),
        output: output.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new(op.name(), n, start).log();
    Ok(())
}

/// `output[i] = input[i]`
pub fn identity(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    elementwise(device, UnaryOp::Identity, input, output, n, block_size)
}

/// `output[i] = 1 / (1 + exp(-input[i]))`
pub fn sigmoid(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    elementwise(device, UnaryOp::Sigmoid, input, output, n, block_size)
}

pub fn tanh(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    elementwise(device, UnaryOp::Tanh, input, output, n, block_size)
}

pub fn arctan(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    elementwise(device, UnaryOp::Arctan, input, output, n, block_size)
}

/// `output[i] = max(input[i], 0)`
pub fn relu(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    n: usize,
    block_size: u32,
) -> Result<()> {
    elementwise(device, UnaryOp::Relu, input, output, n, block_size)
}

/// Column-wise softmax of a column-major `rows x cols` matrix
///
/// Each column is shifted by its maximum before exponentiation.
#[tracing::instrument(skip(device, input, output))]
pub fn softmax_columns(
    device: &Device,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    rows: usize,
    cols: usize,
    block_size: u32,
) -> Result<()> {
    let start = Instant::now();
    let n = element_count("softmax input", rows, cols, input.len())?;
    require_len(device, "softmax input", input, n)?;
    require_len(device, "softmax output", output, n)?;

    let kernel = Kernel::SoftmaxColumns {
        rows,
        cols,
        input: input.handle(),
        output: output.handle(),
    };
    launch_1d(device, &kernel, block_size)?;

    ExecutionMetrics::new("softmax", n, start).log();
    Ok(())
}

/// Apply `activation` to a column-major `rows x cols` matrix
pub fn apply(
    device: &Device,
    activation: Activation,
    input: &DeviceArray<f32>,
    output: &mut DeviceArray<f32>,
    rows: usize,
    cols: usize,
    block_size: u32,
) -> Result<()> {
    let n = element_count("activation input", rows, cols, input.len())?;
    match activation {
        Activation::Identity => identity(device, input, output, n, block_size),
        Activation::Sigmoid => sigmoid(device, input, output, n, block_size),
        Activation::Tanh => tanh(device, input, output, n, block_size),
        Activation::Arctan => arctan(device, input, output, n, block_size),
        Activation::Relu => relu(device, input, output, n, block_size),
        Activation::Softmax => softmax_columns(device, input, output, rows, cols, block_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn run(activation: Activation, input: &[f32], rows: usize, cols: usize) -> Vec<f32> {
        let device = Device::new().unwrap();
        let input = device.upload(input).unwrap();
        let mut output = device.allocate::<f32>(rows * cols).unwrap();
        apply(&device, activation, &input, &mut output, rows, cols, 256).unwrap();
        output.to_vec().unwrap()
    }

    #[test]
    fn test_sigmoid() {
        let result = run(Activation::Sigmoid, &[0.0, 2.0, -2.0], 3, 1);
        assert!((result[0] - 0.5).abs() < 1e-6);
        assert!((result[1] - 1.0 / (1.0 + (-2.0f32).exp())).abs() < 1e-6);
        assert!((result[1] + result[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_and_arctan() {
        let tanh = run(Activation::Tanh, &[0.5, -0.5], 2, 1);
        assert!((tanh[0] - 0.5f32.tanh()).abs() < 1e-6);
        assert!((tanh[0] + tanh[1]).abs() < 1e-6);

        let arctan = run(Activation::Arctan, &[1.0], 1, 1);
        assert!((arctan[0] - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn test_relu_and_identity() {
        assert_eq!(run(Activation::Relu, &[-1.0, 0.0, 3.0], 3, 1), vec![0.0, 0.0, 3.0]);
        assert_eq!(run(Activation::Identity, &[-1.0, 0.0, 3.0], 3, 1), vec![-1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_softmax_columns_sum_to_one() {
        // 3 x 2, column-major
        let result = run(Activation::Softmax, &[1.0, 2.0, 3.0, -5.0, 0.0, 5.0], 3, 2);
        for column in result.chunks(3) {
            let sum: f32 = column.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(column[2] > column[1] && column[1] > column[0]);
        }
    }

    #[test]
    fn test_softmax_large_inputs_stay_finite() {
        let result = run(Activation::Softmax, &[1000.0, 1000.0], 2, 1);
        assert!((result[0] - 0.5).abs() < 1e-6);
        assert!((result[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_rejects_overflowing_shape() {
        let device = Device::new().unwrap();
        let input = device.allocate::<f32>(4).unwrap();
        let mut output = device.allocate::<f32>(4).unwrap();
        assert!(matches!(
            softmax_columns(&device, &input, &mut output, usize::MAX / 2, 3, 256),
            Err(Error::ShapeMismatch { expected: usize::MAX, actual: 4, .. })
        ));
        assert!(matches!(
            apply(&device, Activation::Relu, &input, &mut output, 3, usize::MAX / 2, 256),
            Err(Error::ShapeMismatch { expected: usize::MAX, .. })
        ));
    }
}
