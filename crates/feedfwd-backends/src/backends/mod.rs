//! Backend implementations

pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use cpu::{CpuBackend, CpuBackendConfig};

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
