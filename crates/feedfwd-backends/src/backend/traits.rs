//! Backend trait for device memory and kernel execution

use super::kernel::{GemmParams, Kernel};
use super::types::{BufferHandle, DeviceProperties, LaunchConfig};
use crate::error::Result;

/// Backend trait for kernel execution
///
/// A backend owns one device: its allocator, host/device copies, the closed
/// set of [`Kernel`]s and a column-major sgemm.
///
/// # Ordering
///
/// Work is issued by a single orchestrating thread. [`Backend::launch`] and
/// [`Backend::gemm`] return once the work has either completed (CPU) or been
/// enqueued on the device's single default stream (CUDA). Either way, any
/// later launch, gemm or copy on the same backend observes every write of the
/// earlier ones, so a layer's linear step always sees the previous layer's
/// activation. Copies are synchronous.
///
/// # Memory
///
/// Buffers are untyped byte ranges. Kernels interpret them as `f32`.
/// `free_buffer` returns the storage to the allocator; the handle is dead
/// afterwards and any further use is [`BackendError::InvalidBufferHandle`].
///
/// [`BackendError::InvalidBufferHandle`]: crate::BackendError::InvalidBufferHandle
pub trait Backend {
    /// Static properties of the underlying device
    fn properties(&self) -> &DeviceProperties;

    /// Launch a kernel
    ///
    /// Fails with `InvalidLaunchConfig` when the geometry does not fit the
    /// device or does not cover [`Kernel::task_count`], and with
    /// `AliasedBuffers` when the output handle is also an input.
    fn launch(&mut self, kernel: &Kernel, config: &LaunchConfig) -> Result<()>;

    /// Column-major `C = alpha * A * B + beta * C`
    fn gemm(&mut self, params: &GemmParams) -> Result<()>;

    /// Allocate a buffer of `size` bytes
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    /// Free a buffer
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Copy host bytes to the start of a buffer
    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Copy the start of a buffer into host bytes
    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()>;

    /// Size in bytes of a live buffer
    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Bytes currently held by live buffers
    fn allocated_bytes(&self) -> usize;

    /// Block until all issued work has completed
    fn synchronize(&mut self) -> Result<()>;
}
