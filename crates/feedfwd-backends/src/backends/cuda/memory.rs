//! CUDA memory management for device buffers

use std::collections::HashMap;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice};

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};

const WORD_BYTES: usize = std::mem::size_of::<f32>();

/// Device buffers keyed by handle, stored as `f32` words
pub(super) struct CudaMemoryManager {
    device: Arc<CudaDevice>,
    buffers: HashMap<u64, (CudaSlice<f32>, usize)>,
    next_buffer_handle: u64,
    allocated_bytes: usize,
}

impl CudaMemoryManager {
    pub(super) fn new(device: Arc<CudaDevice>) -> Self {
        Self {
            device,
            buffers: HashMap::new(),
            next_buffer_handle: 1,
            allocated_bytes: 0,
        }
    }

    pub(super) fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub(super) fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let words = size.div_ceil(WORD_BYTES).max(1);
        let slice = self.device.alloc_zeros::<f32>(words).map_err(|err| {
            let available = cudarc::driver::result::mem_get_info()
                .map(|(free, _)| free)
                .unwrap_or(0);
            tracing::warn!(requested = size, available, error = %err, "cuda_allocation_failed");
            BackendError::OutOfMemory {
                requested: size,
                available,
            }
        })?;

        let handle = BufferHandle::new(self.next_buffer_handle);
        self.next_buffer_handle += 1;
        self.buffers.insert(handle.id(), (slice, size));
        self.allocated_bytes += size;

        Ok(handle)
    }

    pub(super) fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let (_slice, size) = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        // Device memory is returned when the slice drops
        self.allocated_bytes -= size;
        Ok(())
    }

    pub(super) fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let (slice, size) = self
            .buffers
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;

        if data.len() > *size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: *size,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut words = vec![0.0f32; data.len().div_ceil(WORD_BYTES)];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);
        bytes[..data.len()].copy_from_slice(data);
        let mut view = slice.slice_mut(0..words.len());
        self.device
            .htod_sync_copy_into(&words, &mut view)
            .map_err(|err| BackendError::driver("host-to-device copy", err))
    }

    pub(super) fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let (slice, size) = self
            .buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;

        if data.len() > *size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: *size,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut words = vec![0.0f32; data.len().div_ceil(WORD_BYTES)];
        let view = slice.slice(0..words.len());
        self.device
            .dtoh_sync_copy_into(&view, &mut words)
            .map_err(|err| BackendError::driver("device-to-host copy", err))?;

        let bytes: &[u8] = bytemuck::cast_slice(&words);
        data.copy_from_slice(&bytes[..data.len()]);
        Ok(())
    }

    pub(super) fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.buffers
            .get(&handle.id())
            .map(|(_, size)| *size)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    /// Device slice holding at least `len` words
    pub(super) fn slice(&self, handle: BufferHandle, len: usize) -> Result<&CudaSlice<f32>> {
        let (slice, size) = self
            .buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        check_words(*size, len)?;
        Ok(slice)
    }

    /// Detach a buffer for writing; pair with [`CudaMemoryManager::restore`]
    pub(super) fn take(&mut self, handle: BufferHandle, len: usize) -> Result<(CudaSlice<f32>, usize)> {
        let (slice, size) = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        if let Err(err) = check_words(size, len) {
            self.buffers.insert(handle.id(), (slice, size));
            return Err(err);
        }
        Ok((slice, size))
    }

    pub(super) fn restore(&mut self, handle: BufferHandle, buffer: (CudaSlice<f32>, usize)) {
        self.buffers.insert(handle.id(), buffer);
    }
}

fn check_words(size: usize, len: usize) -> Result<()> {
    if len * WORD_BYTES > size {
        return Err(BackendError::BufferOutOfBounds {
            offset: 0,
            size: len * WORD_BYTES,
            buffer_size: size,
        });
    }
    Ok(())
}
