//! Memory manager for the CPU backend
//!
//! Buffers are stored as `f32` words so kernels read them without unaligned
//! casts; byte-level copies go through `bytemuck`. A fixed byte budget stands
//! in for device memory so allocation failure can be exercised.

use std::collections::HashMap;

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};

const WORD_BYTES: usize = std::mem::size_of::<f32>();

/// Storage behind one buffer handle
pub(crate) struct DeviceBuffer {
    pub(crate) words: Vec<f32>,
    size: usize,
}

/// Buffer table plus the byte budget it allocates from
pub(crate) struct MemoryManager {
    buffers: HashMap<u64, DeviceBuffer>,
    next_buffer_id: u64,
    allocated_bytes: usize,
    capacity_bytes: usize,
}

impl MemoryManager {
    pub(crate) fn new(capacity_bytes: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
            allocated_bytes: 0,
            capacity_bytes,
        }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Allocate a zeroed buffer of `size` bytes
    pub(crate) fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let available = self.capacity_bytes.saturating_sub(self.allocated_bytes);
        if size > available {
            return Err(BackendError::OutOfMemory {
                requested: size,
                available,
            });
        }

        let word_count = size.div_ceil(WORD_BYTES);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| BackendError::OutOfMemory {
                requested: size,
                available,
            })?;
        words.resize(word_count, 0.0);

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, DeviceBuffer { words, size });
        self.allocated_bytes += size;

        Ok(BufferHandle::new(id))
    }

    pub(crate) fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let buffer = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        self.allocated_bytes -= buffer.size;
        Ok(())
    }

    pub(crate) fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;

        if data.len() > buffer.size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: buffer.size,
            });
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut buffer.words);
        bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;

        if data.len() > buffer.size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: buffer.size,
            });
        }

        let bytes: &[u8] = bytemuck::cast_slice(&buffer.words);
        data.copy_from_slice(&bytes[..data.len()]);
        Ok(())
    }

    pub(crate) fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.buffers
            .get(&handle.id())
            .map(|buffer| buffer.size)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    /// Read-only view of a buffer holding at least `len` words
    pub(crate) fn words(&self, handle: BufferHandle, len: usize) -> Result<&[f32]> {
        let buffer = self
            .buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        check_words(buffer, len)?;
        Ok(&buffer.words[..len])
    }

    /// Detach a buffer so it can be written while others are read
    ///
    /// Must be paired with [`MemoryManager::restore`].
    pub(crate) fn take(&mut self, handle: BufferHandle, len: usize) -> Result<DeviceBuffer> {
        let buffer = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        if let Err(err) = check_words(&buffer, len) {
            self.buffers.insert(handle.id(), buffer);
            return Err(err);
        }
        Ok(buffer)
    }

    pub(crate) fn restore(&mut self, handle: BufferHandle, buffer: DeviceBuffer) {
        self.buffers.insert(handle.id(), buffer);
    }
}

fn check_words(buffer: &DeviceBuffer, len: usize) -> Result<()> {
    if len * WORD_BYTES > buffer.size {
        return Err(BackendError::BufferOutOfBounds {
            offset: 0,
            size: len * WORD_BYTES,
            buffer_size: buffer.size,
        });
    }
    Ok(())
}
