//! CUDA backend implementation
//!
//! Kernels are compiled from CUDA C with NVRTC when the backend is created and
//! loaded as one module; dense matrix multiply goes to cuBLAS. Launches, sgemm
//! and copies all use the device's default stream, so issue order is
//! execution order.

mod kernels;
mod memory;

use std::sync::Arc;

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig};
use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync};
use feedfwd_tracing::perf_span;

use crate::backend::{Backend, BufferHandle, DeviceProperties, GemmParams, Kernel, LaunchConfig};
use crate::error::{BackendError, Result};
use memory::CudaMemoryManager;

/// CUDA backend for one device ordinal
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
    memory: CudaMemoryManager,
    properties: DeviceProperties,
}

impl CudaBackend {
    /// Open device `ordinal`, compile the kernel module and create a cuBLAS handle
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(|err| BackendError::driver("device init", err))?;

        let ptx = cudarc::nvrtc::compile_ptx(kernels::KERNEL_SOURCE)
            .map_err(|err| BackendError::driver("kernel compilation", err))?;
        device
            .load_ptx(ptx, kernels::MODULE_NAME, kernels::KERNEL_NAMES)
            .map_err(|err| BackendError::driver("module load", err))?;

        let blas = CudaBlas::new(device.clone()).map_err(|err| BackendError::driver("cuBLAS init", err))?;

        let attribute = |attr: CUdevice_attribute| -> Result<u32> {
            device
                .attribute(attr)
                .map(|value| value.max(0) as u32)
                .map_err(|err| BackendError::driver("attribute query", err))
        };
        let max_grid_dim_x = attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?;
        let max_threads_per_block = attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?;

        let name = device.name().map_err(|err| BackendError::driver("name query", err))?;
        device
            .bind_to_thread()
            .map_err(|err| BackendError::driver("context bind", err))?;
        let (_, total_memory) =
            cudarc::driver::result::mem_get_info().map_err(|err| BackendError::driver("memory query", err))?;

        tracing::info!(
            ordinal,
            name = %name,
            max_grid_dim_x,
            max_threads_per_block,
            total_memory,
            "cuda_backend_created"
        );

        Ok(Self {
            memory: CudaMemoryManager::new(device.clone()),
            device,
            blas,
            properties: DeviceProperties {
                name,
                max_grid_dim_x,
                max_threads_per_block,
                total_memory,
                max_kernel_len: i32::MAX as usize,
            },
        })
    }

    fn launch_into(&self, kernel: &Kernel, config: cudarc::driver::LaunchConfig, out: &mut CudaSlice<f32>) -> Result<()> {
        let func = self
            .device
            .get_func(kernels::MODULE_NAME, kernel.name())
            .ok_or_else(|| BackendError::UnsupportedOperation(format!("kernel {} not loaded", kernel.name())))?;
        let len = kernel.output_len();

        // SAFETY: argument lists match the CUDA signatures in `kernels.rs`, and
        // every buffer was checked to hold at least `len` words.
        let launched = unsafe {
            match *kernel {
                Kernel::SetConstVal { len, value, .. } => func.launch(config, (to_int(len)?, value, out)),
                Kernel::CostXent { len, y_hat, y, .. } | Kernel::DeltaXent { len, y_hat, y, .. } => {
                    let y_hat = self.memory.slice(y_hat, len)?;
                    let y = self.memory.slice(y, len)?;
                    func.launch(config, (to_int(len)?, y_hat, y, out))
                }
                Kernel::Hadamard { len, a, .. } => {
                    let a = self.memory.slice(a, len)?;
                    func.launch(config, (to_int(len)?, a, out))
                }
                Kernel::Unary { len, input, .. } => {
                    let input = self.memory.slice(input, len)?;
                    func.launch(config, (to_int(len)?, input, out))
                }
                Kernel::SoftmaxColumns { rows, cols, input, .. } => {
                    let input = self.memory.slice(input, len)?;
                    func.launch(config, (to_int(rows)?, to_int(cols)?, input, out))
                }
            }
        };

        launched.map_err(|err| BackendError::driver(kernel.name(), err))
    }
}

fn to_int(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| BackendError::invalid_launch(format!("{value} does not fit a CUDA int")))
}

impl Backend for CudaBackend {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn launch(&mut self, kernel: &Kernel, config: &LaunchConfig) -> Result<()> {
        let _span = perf_span!(
            "cuda_launch",
            kernel = kernel.name(),
            tasks = kernel.task_count(),
            grid_size = config.grid.x,
            block_size = config.block.x
        );

        config.validate(kernel.task_count(), &self.properties)?;
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

        let cuda_config = cudarc::driver::LaunchConfig {
            grid_dim: (config.grid.x, 1, 1),
            block_dim: (config.block.x, 1, 1),
            shared_mem_bytes: 0,
        };

        let (mut out, size) = self.memory.take(kernel.output(), len)?;
        let result = self.launch_into(kernel, cuda_config, &mut out);
        self.memory.restore(kernel.output(), (out, size));
        result
    }

    fn gemm(&mut self, params: &GemmParams) -> Result<()> {
        let _span = perf_span!("cuda_sgemm", m = params.m, n = params.n, k = params.k);

        if !params.leading_dims_valid() {
            return Err(BackendError::invalid_launch("sgemm leading dimensions too small"));
        }
        if params.c == params.a || params.c == params.b {
            return Err(BackendError::AliasedBuffers {
                kernel: "sgemm",
                handle: params.c.id(),
            });
        }
        if params.required_c() == 0 {
            return Ok(());
        }

        let config = GemmConfig {
            transa: cublasOperation_t::CUBLAS_OP_N,
            transb: cublasOperation_t::CUBLAS_OP_N,
            m: to_int(params.m)?,
            n: to_int(params.n)?,
            k: to_int(params.k)?,
            alpha: params.alpha,
            lda: to_int(params.lda)?,
            ldb: to_int(params.ldb)?,
            beta: params.beta,
            ldc: to_int(params.ldc)?,
        };

        let (mut c, size) = self.memory.take(params.c, params.required_c())?;
        let result = (|| {
            let a = self.memory.slice(params.a, params.required_a())?;
            let b = self.memory.slice(params.b, params.required_b())?;
            // SAFETY: shapes and leading dimensions were checked against the
            // buffer lengths above.
            unsafe { self.blas.gemm(config, a, b, &mut c) }.map_err(|err| BackendError::driver("cublasSgemm", err))
        })();
        self.memory.restore(params.c, (c, size));
        result
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.memory.allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.free_buffer(handle)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.copy_from_buffer(handle, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.buffer_size(handle)
    }

    fn allocated_bytes(&self) -> usize {
        self.memory.allocated_bytes()
    }

    fn synchronize(&mut self) -> Result<()> {
        self.device
            .synchronize()
            .map_err(|err| BackendError::driver("synchronize", err))
    }
}
