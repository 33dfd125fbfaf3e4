//! Backend implementations for the feedfwd network core
//!
//! This crate provides:
//! - **Backend Trait**: pluggable device interface (allocator, copies, kernel
//!   launch, dense matrix multiply, property query)
//! - **Kernel descriptors**: the closed set of elementwise and per-column
//!   kernels the network core launches
//! - **CPU Backend**: reference implementation executing blocks and lanes on
//!   rayon
//! - **CUDA Backend**: NVRTC-compiled kernels and cuBLAS sgemm (feature `cuda`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 feedfwd-core (Network)                   │
//! │        Device · DeviceArray<T> · ops · Axon              │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  Kernel + LaunchConfig, GemmParams
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Backend Trait                        │
//! └─────────────────────┬───────────────────────────────────┘
//!               ┌───────┴───────┐
//!               ▼               ▼
//!         ┌─────────┐     ┌─────────┐
//!         │   CPU   │     │  CUDA   │
//!         │ Backend │     │ Backend │
//!         └─────────┘     └─────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use feedfwd_backends::{Backend, CpuBackend, Kernel, LaunchConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//!
//! let buffer = backend.allocate_buffer(4 * std::mem::size_of::<f32>())?;
//! let kernel = Kernel::SetConstVal { len: 4, value: 1.5, out: buffer };
//! backend.launch(&kernel, &LaunchConfig::linear(1, 256))?;
//!
//! let mut results = vec![0.0f32; 4];
//! backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut results))?;
//! assert_eq!(results, vec![1.5; 4]);
//!
//! backend.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;

pub use backend::{
    Backend, BlockDim, BufferHandle, DeviceProperties, ExecutionContext, GemmParams, GridDim, Kernel, LaunchConfig,
    UnaryOp,
};
pub use backends::{CpuBackend, CpuBackendConfig};
pub use error::{BackendError, Result};

#[cfg(feature = "cuda")]
pub use backends::CudaBackend;
