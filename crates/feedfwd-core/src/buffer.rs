//! Uniquely owned device arrays
//!
//! A [`DeviceArray<T>`] is the only owner of one backend buffer. It is not
//! `Clone`; moving it transfers ownership. The buffer goes back to the device
//! allocator exactly once, either through [`DeviceArray::release`] or when the
//! array is dropped.
//!
//! ```
//! use feedfwd_core::Device;
//!
//! let device = Device::new()?;
//! let mut array = device.allocate::<f32>(4)?;
//! array.copy_from_slice(&[1.0, 2.0, 3.0, 4.0])?;
//! assert_eq!(array.to_vec()?, vec![1.0, 2.0, 3.0, 4.0]);
//! array.release()?;
//! assert_eq!(device.allocated_bytes(), 0);
//! # Ok::<(), feedfwd_core::Error>(())
//! ```

use std::marker::PhantomData;
use std::time::Instant;

use feedfwd_backends::BufferHandle;
use feedfwd_tracing::perf_event;
use feedfwd_tracing::performance::record_transfer;

use crate::device::{Device, SharedBackend};
use crate::error::{Error, Result};

/// Device-resident array of `len` elements of `T`
pub struct DeviceArray<T> {
    handle: BufferHandle,
    len: usize,
    backend: SharedBackend,
    released: bool,
    _phantom: PhantomData<T>,
}

impl<T: bytemuck::Pod> DeviceArray<T> {
    /// Only [`crate::Device::allocate`] creates arrays.
    pub(crate) fn new(handle: BufferHandle, len: usize, backend: SharedBackend) -> Self {
        Self {
            handle,
            len,
            backend,
            released: false,
            _phantom: PhantomData,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backend handle, valid while `self` is alive
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Whether the array was allocated from `device` or one of its clones
    pub fn is_on(&self, device: &Device) -> bool {
        device.shares_backend(&self.backend)
    }

    /// Total size in bytes
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Copy host data into the array (H2D)
    ///
    /// `src` must have exactly [`DeviceArray::len`] elements.
    #[tracing::instrument(skip(self, src), fields(
        handle = %self.handle,
        elements = src.len(),
        type_name = std::any::type_name::<T>()
    ))]
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        if src.len() != self.len {
            return Err(Error::TransferError {
                expected: self.len,
                actual: src.len(),
            });
        }

        let start = Instant::now();
        self.backend
            .write()
            .copy_to_buffer(self.handle, bytemuck::cast_slice(src))?;
        record_transfer("H2D", std::mem::size_of_val(src), start.elapsed().as_micros() as u64);

        Ok(())
    }

    /// Copy the array into host memory (D2H)
    ///
    /// `dst` must have exactly [`DeviceArray::len`] elements.
    #[tracing::instrument(skip(self, dst), fields(
        handle = %self.handle,
        elements = self.len,
        type_name = std::any::type_name::<T>()
    ))]
    pub fn copy_to_slice(&self, dst: &mut [T]) -> Result<()> {
        if dst.len() != self.len {
            return Err(Error::TransferError {
                expected: self.len,
                actual: dst.len(),
            });
        }

        let start = Instant::now();
        self.backend
            .write()
            .copy_from_buffer(self.handle, bytemuck::cast_slice_mut(dst))?;
        record_transfer("D2H", std::mem::size_of_val(dst), start.elapsed().as_micros() as u64);

        Ok(())
    }

    /// Read the whole array without giving it up
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut data = vec![T::zeroed(); self.len];
        self.copy_to_slice(&mut data)?;
        Ok(data)
    }

    /// Return the storage to the device allocator now
    ///
    /// Consumes the array, so a second release cannot be written.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.backend.write().free_buffer(self.handle)?;
        perf_event!("buffer_released", handle = self.handle.id(), bytes = self.size_bytes());
        Ok(())
    }
}

impl<T> Drop for DeviceArray<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.backend.write().free_buffer(self.handle) {
            tracing::warn!(handle = %self.handle, error = %err, "device array release failed");
        }
    }
}

impl<T> std::fmt::Debug for DeviceArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceArray")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .field("type_name", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Device, DeviceConfig, Error};

    #[test]
    fn test_drop_returns_storage() {
        let device = Device::new().unwrap();
        {
            let _array = device.allocate::<f32>(16).unwrap();
            assert_eq!(device.allocated_bytes(), 64);
        }
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_ownership_transfer_keeps_storage() {
        let device = Device::new().unwrap();
        let array = device.upload(&[5.0f32, 6.0]).unwrap();
        let moved = vec![array];
        assert_eq!(device.allocated_bytes(), 8);
        assert_eq!(moved[0].to_vec().unwrap(), vec![5.0, 6.0]);
        drop(moved);
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_transfer_error_on_length_mismatch() {
        let device = Device::new().unwrap();
        let mut array = device.allocate::<f32>(3).unwrap();
        assert!(matches!(
            array.copy_from_slice(&[1.0, 2.0]),
            Err(Error::TransferError { expected: 3, actual: 2 })
        ));
        let mut dst = [0.0f32; 4];
        assert!(matches!(
            array.copy_to_slice(&mut dst),
            Err(Error::TransferError { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_new_array_is_zeroed() {
        let device = Device::new().unwrap();
        let array = device.allocate::<f32>(5).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![0.0; 5]);
    }

    #[test]
    fn test_release_frees_budget_for_reuse() {
        let device = Device::open(&DeviceConfig {
            cpu_memory_limit_bytes: 64,
            ..DeviceConfig::default()
        })
        .unwrap();
        let array = device.allocate::<f32>(16).unwrap();
        assert!(device.allocate::<f32>(1).is_err());
        array.release().unwrap();
        assert!(device.allocate::<f32>(16).is_ok());
    }
}
