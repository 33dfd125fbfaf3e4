//! CPU backend implementation
//!
//! Reference implementation of the [`Backend`] trait. Kernels run over a
//! simulated grid: rayon across blocks, and again across lanes inside a block.
//!
//! # Architecture
//!
//! ```text
//! CpuBackend
//! ├── MemoryManager  - f32 word buffers + byte budget
//! ├── executor_impl  - kernel dispatch, block/lane fan-out, sgemm
//! └── properties     - configurable grid/block limits
//! ```
//!
//! # Usage
//!
//! ```rust
//! use feedfwd_backends::{Backend, CpuBackend, CpuBackendConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::with_config(CpuBackendConfig {
//!     max_grid_dim_x: 8,
//!     ..CpuBackendConfig::default()
//! });
//! assert_eq!(backend.properties().max_tasks_1d(256), 2048);
//!
//! let buffer = backend.allocate_buffer(1024)?;
//! backend.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

mod executor_impl;
pub(crate) mod memory;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Backend, BufferHandle, DeviceProperties, GemmParams, Kernel, LaunchConfig};
use crate::error::Result;
use memory::MemoryManager;

/// Limits of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBackendConfig {
    /// Byte budget for live buffers
    pub memory_limit_bytes: usize,
    /// Maximum blocks per launch
    pub max_grid_dim_x: u32,
    /// Maximum lanes per block
    pub max_threads_per_block: u32,
}

impl Default for CpuBackendConfig {
    /// Grid and block limits of a compute capability 3.0+ GPU, 4 GiB budget
    fn default() -> Self {
        Self {
            memory_limit_bytes: u32::MAX as usize,
            max_grid_dim_x: 2_147_483_647,
            max_threads_per_block: 1024,
        }
    }
}

/// CPU backend
#[derive(Clone)]
pub struct CpuBackend {
    memory: Arc<RwLock<MemoryManager>>,
    properties: DeviceProperties,
}

impl CpuBackend {
    /// Create a CPU backend with default limits
    pub fn new() -> Self {
        Self::with_config(CpuBackendConfig::default())
    }

    pub fn with_config(config: CpuBackendConfig) -> Self {
        tracing::debug!(
            memory_limit_bytes = config.memory_limit_bytes,
            max_grid_dim_x = config.max_grid_dim_x,
            max_threads_per_block = config.max_threads_per_block,
            "cpu_backend_created"
        );

        Self {
            memory: Arc::new(RwLock::new(MemoryManager::new(config.memory_limit_bytes))),
            properties: DeviceProperties {
                name: "cpu-reference".to_string(),
                max_grid_dim_x: config.max_grid_dim_x,
                max_threads_per_block: config.max_threads_per_block,
                total_memory: config.memory_limit_bytes,
                max_kernel_len: usize::MAX,
            },
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn launch(&mut self, kernel: &Kernel, config: &LaunchConfig) -> Result<()> {
        executor_impl::launch(&mut self.memory.write(), kernel, config, &self.properties)
    }

    fn gemm(&mut self, params: &GemmParams) -> Result<()> {
        executor_impl::gemm(&mut self.memory.write(), params)
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.memory.write().allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.write().free_buffer(handle)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.read().buffer_size(handle)
    }

    fn allocated_bytes(&self) -> usize {
        self.memory.read().allocated_bytes()
    }

    fn synchronize(&mut self) -> Result<()> {
        // Every launch has already completed when it returns
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UnaryOp;
    use crate::error::BackendError;

    fn upload(backend: &mut CpuBackend, data: &[f32]) -> BufferHandle {
        let handle = backend.allocate_buffer(std::mem::size_of_val(data)).unwrap();
        backend.copy_to_buffer(handle, bytemuck::cast_slice(data)).unwrap();
        handle
    }

    fn download(backend: &mut CpuBackend, handle: BufferHandle, len: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; len];
        backend
            .copy_from_buffer(handle, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        out
    }

    #[test]
    fn test_cpu_backend_creation() {
        let backend = CpuBackend::new();
        assert_eq!(backend.properties().max_grid_dim_x, 2_147_483_647);
        assert_eq!(backend.properties().max_threads_per_block, 1024);
        assert_eq!(backend.allocated_bytes(), 0);
    }

    #[test]
    fn test_set_const_val_partial_length() {
        let mut backend = CpuBackend::new();
        let out = upload(&mut backend, &[9.0; 6]);
        let kernel = Kernel::SetConstVal {
            len: 4,
            value: 0.5,
            out,
        };
        backend.launch(&kernel, &LaunchConfig::linear(2, 2)).unwrap();
        assert_eq!(download(&mut backend, out, 6), vec![0.5, 0.5, 0.5, 0.5, 9.0, 9.0]);
    }

    #[test]
    fn test_hadamard_in_place() {
        let mut backend = CpuBackend::new();
        let a = upload(&mut backend, &[1.0, 2.0, 3.0]);
        let b = upload(&mut backend, &[4.0, 5.0, 6.0]);
        let kernel = Kernel::Hadamard { len: 3, a, b };
        backend.launch(&kernel, &LaunchConfig::linear(1, 256)).unwrap();
        assert_eq!(download(&mut backend, b, 3), vec![4.0, 10.0, 18.0]);
        assert_eq!(download(&mut backend, a, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unary_relu() {
        let mut backend = CpuBackend::new();
        let input = upload(&mut backend, &[-1.0, 0.0, 2.0]);
        let output = backend.allocate_buffer(12).unwrap();
        let kernel = Kernel::Unary {
            op: UnaryOp::Relu,
            len: 3,
            input,
            output,
        };
        backend.launch(&kernel, &LaunchConfig::linear(1, 32)).unwrap();
        assert_eq!(download(&mut backend, output, 3), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_softmax_columns() {
        let mut backend = CpuBackend::new();
        let input = upload(&mut backend, &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let output = backend.allocate_buffer(24).unwrap();
        let kernel = Kernel::SoftmaxColumns {
            rows: 2,
            cols: 3,
            input,
            output,
        };
        backend.launch(&kernel, &LaunchConfig::linear(2, 2)).unwrap();
        for value in download(&mut backend, output, 6) {
            assert!((value - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_launch_rejects_aliasing() {
        let mut backend = CpuBackend::new();
        let buffer = upload(&mut backend, &[1.0, 2.0]);
        let kernel = Kernel::Unary {
            op: UnaryOp::Sigmoid,
            len: 2,
            input: buffer,
            output: buffer,
        };
        assert!(matches!(
            backend.launch(&kernel, &LaunchConfig::linear(1, 2)),
            Err(BackendError::AliasedBuffers { .. })
        ));
    }

    #[test]
    fn test_launch_rejects_grid_over_limit() {
        let mut backend = CpuBackend::with_config(CpuBackendConfig {
            max_grid_dim_x: 2,
            ..CpuBackendConfig::default()
        });
        let out = backend.allocate_buffer(4 * 12).unwrap();
        let kernel = Kernel::SetConstVal {
            len: 12,
            value: 1.0,
            out,
        };
        assert!(matches!(
            backend.launch(&kernel, &LaunchConfig::linear(3, 4)),
            Err(BackendError::InvalidLaunchConfig(_))
        ));
    }

    #[test]
    fn test_launch_rejects_short_input() {
        let mut backend = CpuBackend::new();
        let a = upload(&mut backend, &[1.0, 2.0]);
        let b = upload(&mut backend, &[1.0, 2.0, 3.0]);
        let kernel = Kernel::Hadamard { len: 3, a, b };
        assert!(matches!(
            backend.launch(&kernel, &LaunchConfig::linear(1, 4)),
            Err(BackendError::BufferOutOfBounds { .. })
        ));
        // Output buffer survives the failed launch
        assert_eq!(download(&mut backend, b, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_gemm_column_major() {
        let mut backend = CpuBackend::new();
        // A = [[1, 2], [3, 4]] column-major, B = [[5], [6]]
        let a = upload(&mut backend, &[1.0, 3.0, 2.0, 4.0]);
        let b = upload(&mut backend, &[5.0, 6.0]);
        let c = upload(&mut backend, &[1.0, 1.0]);
        let params = GemmParams {
            m: 2,
            n: 1,
            k: 2,
            alpha: 1.0,
            a,
            lda: 2,
            b,
            ldb: 2,
            beta: 1.0,
            c,
            ldc: 2,
        };
        backend.gemm(&params).unwrap();
        assert_eq!(download(&mut backend, c, 2), vec![18.0, 40.0]);
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let mut backend = CpuBackend::new();
        let a = upload(&mut backend, &[2.0]);
        let b = upload(&mut backend, &[1.0, 1.0, 1.0]);
        let c = upload(&mut backend, &[f32::NAN; 3]);
        let params = GemmParams {
            m: 1,
            n: 3,
            k: 1,
            alpha: 1.0,
            a,
            lda: 1,
            b,
            ldb: 1,
            beta: 0.0,
            c,
            ldc: 1,
        };
        backend.gemm(&params).unwrap();
        assert_eq!(download(&mut backend, c, 3), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_free_releases_budget() {
        let mut backend = CpuBackend::with_config(CpuBackendConfig {
            memory_limit_bytes: 64,
            ..CpuBackendConfig::default()
        });
        let first = backend.allocate_buffer(64).unwrap();
        assert!(matches!(
            backend.allocate_buffer(4),
            Err(BackendError::OutOfMemory { .. })
        ));
        backend.free_buffer(first).unwrap();
        assert!(backend.allocate_buffer(64).is_ok());
    }
}
