//! Kernel descriptors
//!
//! The network core never ships code to a backend. It names one of a closed
//! set of kernels and the buffers it touches; each backend supplies its own
//! implementation (rayon closures on the CPU, NVRTC-compiled CUDA C on a GPU).
//!
//! Every elementwise kernel follows the same discipline: one logical task per
//! output element, global index `idx = block_idx * block_dim + lane_idx`,
//! lanes with `idx >= len` do nothing.

use super::types::BufferHandle;

/// Elementwise map applied by [`Kernel::Unary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Identity,
    Sigmoid,
    Tanh,
    Arctan,
    Relu,
}

impl UnaryOp {
    /// Reference scalar definition, shared by the CPU backend and tests
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Identity => x,
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => x.tanh(),
            Self::Arctan => x.atan(),
            Self::Relu => x.max(0.0),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Arctan => "arctan",
            Self::Relu => "relu",
        }
    }
}

/// A kernel launch request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// `out[k] = value` for `k < len`
    SetConstVal { len: usize, value: f32, out: BufferHandle },

    /// `out[k] = -(y[k] ln y_hat[k] + (1 - y[k]) ln(1 - y_hat[k]))`
    ///
    /// Not clamped: `y_hat` of exactly 0 or 1 yields infinities or NaN.
    CostXent {
        len: usize,
        y_hat: BufferHandle,
        y: BufferHandle,
        out: BufferHandle,
    },

    /// `out[k] = (y_hat[k] - y[k]) / (y_hat[k] (1 - y_hat[k]))`
    DeltaXent {
        len: usize,
        y_hat: BufferHandle,
        y: BufferHandle,
        out: BufferHandle,
    },

    /// In place `b[k] *= a[k]`
    Hadamard { len: usize, a: BufferHandle, b: BufferHandle },

    /// `output[k] = op(input[k])`
    Unary {
        op: UnaryOp,
        len: usize,
        input: BufferHandle,
        output: BufferHandle,
    },

    /// Column-wise softmax of a column-major `rows x cols` matrix.
    ///
    /// One task per column; the column maximum is subtracted before
    /// exponentiation.
    SoftmaxColumns {
        rows: usize,
        cols: usize,
        input: BufferHandle,
        output: BufferHandle,
    },
}

impl Kernel {
    /// Kernel name, also the CUDA entry point
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetConstVal { .. } => "setconstval_kernel",
            Self::CostXent { .. } => "costxent_kernel",
            Self::DeltaXent { .. } => "deltaxent_kernel",
            Self::Hadamard { .. } => "hadamard_kernel",
            Self::Unary { op, .. } => match op {
                UnaryOp::Identity => "identity_kernel",
                UnaryOp::Sigmoid => "sigmoid_kernel",
                UnaryOp::Tanh => "tanh_kernel",
                UnaryOp::Arctan => "arctan_kernel",
                UnaryOp::Relu => "relu_kernel",
            },
            Self::SoftmaxColumns { .. } => "softmax_columns_kernel",
        }
    }

    /// Number of logical tasks (lanes doing useful work)
    pub const fn task_count(&self) -> usize {
        match *self {
            Self::SetConstVal { len, .. }
            | Self::CostXent { len, .. }
            | Self::DeltaXent { len, .. }
            | Self::Hadamard { len, .. }
            | Self::Unary { len, .. } => len,
            Self::SoftmaxColumns { cols, .. } => cols,
        }
    }

    /// Output elements written by one task
    pub const fn elements_per_task(&self) -> usize {
        match *self {
            Self::SoftmaxColumns { rows, .. } => rows,
            _ => 1,
        }
    }

    /// Total output elements written
    pub const fn output_len(&self) -> usize {
        self.task_count() * self.elements_per_task()
    }

    /// The buffer the kernel writes
    pub const fn output(&self) -> BufferHandle {
        match *self {
            Self::SetConstVal { out, .. } | Self::CostXent { out, .. } | Self::DeltaXent { out, .. } => out,
            Self::Hadamard { b, .. } => b,
            Self::Unary { output, .. } | Self::SoftmaxColumns { output, .. } => output,
        }
    }

    /// Buffers the kernel only reads
    pub fn inputs(&self) -> Vec<BufferHandle> {
        match *self {
            Self::SetConstVal { .. } => Vec::new(),
            Self::CostXent { y_hat, y, .. } | Self::DeltaXent { y_hat, y, .. } => vec![y_hat, y],
            Self::Hadamard { a, .. } => vec![a],
            Self::Unary { input, .. } | Self::SoftmaxColumns { input, .. } => vec![input],
        }
    }

    /// First input that is also the output, if any
    pub fn aliased_input(&self) -> Option<BufferHandle> {
        let output = self.output();
        self.inputs().into_iter().find(|&input| input == output)
    }
}

/// Column-major single precision `C = alpha * A * B + beta * C`
///
/// `A` is `m x k` with leading dimension `lda`, `B` is `k x n` with leading
/// dimension `ldb`, `C` is `m x n` with leading dimension `ldc`. With
/// `beta == 0` the previous contents of `C` are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f32,
    pub a: BufferHandle,
    pub lda: usize,
    pub b: BufferHandle,
    pub ldb: usize,
    pub beta: f32,
    pub c: BufferHandle,
    pub ldc: usize,
}

impl GemmParams {
    /// Elements a buffer with `rows x cols` at leading dimension `ld` must hold
    pub const fn required_len(rows: usize, cols: usize, ld: usize) -> usize {
        if rows == 0 || cols == 0 {
            0
        } else {
            ld * (cols - 1) + rows
        }
    }

    pub const fn required_a(&self) -> usize {
        Self::required_len(self.m, self.k, self.lda)
    }

    pub const fn required_b(&self) -> usize {
        Self::required_len(self.k, self.n, self.ldb)
    }

    pub const fn required_c(&self) -> usize {
        Self::required_len(self.m, self.n, self.ldc)
    }

    /// Leading dimensions must cover the row counts
    pub const fn leading_dims_valid(&self) -> bool {
        self.lda >= if self.m > 0 { self.m } else { 1 }
            && self.ldb >= if self.k > 0 { self.k } else { 1 }
            && self.ldc >= if self.m > 0 { self.m } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_reference_values() {
        assert_eq!(UnaryOp::Sigmoid.apply(0.0), 0.5);
        assert_eq!(UnaryOp::Relu.apply(-3.0), 0.0);
        assert_eq!(UnaryOp::Relu.apply(2.5), 2.5);
        assert!((UnaryOp::Arctan.apply(1.0) - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
        assert_eq!(UnaryOp::Identity.apply(-7.25), -7.25);
    }

    #[test]
    fn test_task_geometry() {
        let softmax = Kernel::SoftmaxColumns {
            rows: 3,
            cols: 5,
            input: BufferHandle::new(1),
            output: BufferHandle::new(2),
        };
        assert_eq!(softmax.task_count(), 5);
        assert_eq!(softmax.elements_per_task(), 3);
        assert_eq!(softmax.output_len(), 15);

        let fill = Kernel::SetConstVal {
            len: 10,
            value: 0.0,
            out: BufferHandle::new(3),
        };
        assert_eq!(fill.output_len(), 10);
        assert!(fill.inputs().is_empty());
    }

    #[test]
    fn test_aliased_input_detected() {
        let kernel = Kernel::Hadamard {
            len: 4,
            a: BufferHandle::new(7),
            b: BufferHandle::new(7),
        };
        assert_eq!(kernel.aliased_input(), Some(BufferHandle::new(7)));

        let kernel = Kernel::CostXent {
            len: 4,
            y_hat: BufferHandle::new(1),
            y: BufferHandle::new(2),
            out: BufferHandle::new(3),
        };
        assert_eq!(kernel.aliased_input(), None);
    }

    #[test]
    fn test_gemm_required_lengths() {
        let params = GemmParams {
            m: 4,
            n: 5,
            k: 3,
            alpha: 1.0,
            a: BufferHandle::new(1),
            lda: 4,
            b: BufferHandle::new(2),
            ldb: 3,
            beta: 0.0,
            c: BufferHandle::new(3),
            ldc: 4,
        };
        assert_eq!(params.required_a(), 12);
        assert_eq!(params.required_b(), 15);
        assert_eq!(params.required_c(), 20);
        assert!(params.leading_dims_valid());
        assert_eq!(GemmParams::required_len(0, 5, 1), 0);
    }
}
