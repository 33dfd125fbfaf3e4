//! Device handle: backend selection, allocation and launch sizing
//!
//! A [`Device`] owns the backend behind `Arc<RwLock<..>>` and caches the
//! device properties queried when it was opened. It is cheap to clone; every
//! clone and every [`DeviceArray`] allocated from it share the same backend.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

#[cfg(feature = "cuda")]
use feedfwd_backends::CudaBackend;
use feedfwd_backends::{Backend, BackendError, CpuBackend, DeviceProperties, GemmParams, Kernel, LaunchConfig};

use crate::buffer::DeviceArray;
use crate::config::{BackendType, DeviceConfig};
use crate::error::{Error, Result};

/// Backend shared between a device and the arrays allocated from it
pub(crate) type SharedBackend = Arc<RwLock<Box<dyn Backend + Send + Sync>>>;

/// Default lanes per block for 1-D launches
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// An opened accelerator
#[derive(Clone)]
pub struct Device {
    backend: SharedBackend,
    backend_type: BackendType,
    index: usize,
    properties: DeviceProperties,
}

impl Device {
    /// Open the CPU backend with default limits
    #[tracing::instrument]
    pub fn new() -> Result<Self> {
        Self::open(&DeviceConfig::default())
    }

    /// Open the device described by `config`
    ///
    /// # Example
    ///
    /// ```
    /// use feedfwd_core::{Device, DeviceConfig};
    ///
    /// let config = DeviceConfig {
    ///     cpu_max_grid_dim_x: 4,
    ///     ..DeviceConfig::default()
    /// };
    /// let device = Device::open(&config)?;
    /// assert_eq!(device.max_device_array_size_1d(), 4);
    /// # Ok::<(), feedfwd_core::Error>(())
    /// ```
    #[tracing::instrument(skip(config), fields(backend = ?config.backend, index = config.device_index))]
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let start = Instant::now();

        let backend: Box<dyn Backend + Send + Sync> = match config.backend {
            BackendType::Cpu => {
                if config.device_index != 0 {
                    return Err(Error::InvalidConfig(format!(
                        "CPU backend has a single device, index {} requested",
                        config.device_index
                    )));
                }
                Box::new(CpuBackend::with_config(config.cpu_backend_config()))
            }
            BackendType::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    Box::new(CudaBackend::new(config.device_index)?)
                }
                #[cfg(not(feature = "cuda"))]
                {
                    return Err(Error::InvalidConfig(
                        "CUDA backend requires the 'cuda' feature to be enabled".into(),
                    ));
                }
            }
        };

        let device = Self::with_backend(backend, config.backend, config.device_index);

        tracing::debug!(
            duration_us = start.elapsed().as_micros() as u64,
            name = %device.properties.name,
            max_grid_dim_x = device.properties.max_grid_dim_x,
            max_threads_per_block = device.properties.max_threads_per_block,
            "device_opened"
        );

        Ok(device)
    }

    /// Open CUDA device 0 if available, otherwise the CPU backend
    #[tracing::instrument]
    pub fn new_auto() -> Result<Self> {
        let cuda = DeviceConfig {
            backend: BackendType::Cuda,
            ..DeviceConfig::default()
        };
        match Self::open(&cuda) {
            Ok(device) => {
                tracing::info!("Auto-selected CUDA backend");
                Ok(device)
            }
            Err(err) => {
                tracing::info!(reason = %err, "Auto-selected CPU backend (fallback)");
                Self::new()
            }
        }
    }

    /// Wrap an already constructed backend
    pub fn with_backend(backend: Box<dyn Backend + Send + Sync>, backend_type: BackendType, index: usize) -> Self {
        let properties = backend.properties().clone();
        Self {
            backend: Arc::new(RwLock::new(backend)),
            backend_type,
            index,
            properties,
        }
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Properties cached when the device was opened
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Maximum grid extent in x, cached at open
    pub fn max_device_array_size_1d(&self) -> u32 {
        self.properties.max_grid_dim_x
    }

    pub(crate) fn shares_backend(&self, backend: &SharedBackend) -> bool {
        Arc::ptr_eq(&self.backend, backend)
    }

    /// Bytes held by live device arrays
    pub fn allocated_bytes(&self) -> usize {
        self.backend.read().allocated_bytes()
    }

    /// Allocate a zero-initialised array of `len` elements
    #[tracing::instrument(skip(self), fields(type_name = std::any::type_name::<T>()))]
    pub fn allocate<T: bytemuck::Pod>(&self, len: usize) -> Result<DeviceArray<T>> {
        let start = Instant::now();
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::AllocationError {
                requested: usize::MAX,
                reason: format!("{len} elements overflow the addressable byte count"),
            })?;

        let handle = self.backend.write().allocate_buffer(bytes).map_err(|err| match err {
            BackendError::OutOfMemory { requested, available } => Error::AllocationError {
                requested,
                reason: format!("only {available} bytes available"),
            },
            other => Error::Backend(other),
        })?;

        tracing::debug!(
            duration_us = start.elapsed().as_micros() as u64,
            handle = %handle,
            bytes,
            "buffer_allocated"
        );

        Ok(DeviceArray::new(handle, len, Arc::clone(&self.backend)))
    }

    /// Allocate an array and fill it from `src`
    pub fn upload<T: bytemuck::Pod>(&self, src: &[T]) -> Result<DeviceArray<T>> {
        let mut array = self.allocate(src.len())?;
        array.copy_from_slice(src)?;
        Ok(array)
    }

    /// Read an array back and release it
    pub fn download<T: bytemuck::Pod>(&self, array: DeviceArray<T>) -> Result<Vec<T>> {
        let data = array.to_vec()?;
        array.release()?;
        Ok(data)
    }

    /// Launch geometry covering `tasks` with `block_size` lanes per block
    ///
    /// Returns `Ok(None)` for zero tasks: nothing needs to launch.
    pub fn launch_config_1d(&self, tasks: usize, block_size: u32) -> Result<Option<LaunchConfig>> {
        if block_size == 0 || block_size > self.properties.max_threads_per_block {
            return Err(Error::InvalidLaunch(format!(
                "block size {block_size} outside 1..={}",
                self.properties.max_threads_per_block
            )));
        }
        if tasks == 0 {
            return Ok(None);
        }

        let capacity = self.properties.max_tasks_1d(block_size);
        if tasks > capacity {
            return Err(Error::CapacityExceeded {
                requested: tasks,
                capacity,
            });
        }

        let blocks = tasks.div_ceil(block_size as usize);
        Ok(Some(LaunchConfig::linear(blocks as u32, block_size)))
    }

    pub(crate) fn launch(&self, kernel: &Kernel, config: &LaunchConfig) -> Result<()> {
        self.backend.write().launch(kernel, config)?;
        Ok(())
    }

    pub(crate) fn gemm(&self, params: &GemmParams) -> Result<()> {
        self.backend.write().gemm(params)?;
        Ok(())
    }

    /// Wait for all issued work
    pub fn synchronize(&self) -> Result<()> {
        self.backend.write().synchronize()?;
        Ok(())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend_type", &self.backend_type)
            .field("index", &self.index)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Maximum grid extent in x of device `device_index` of the configured backend
///
/// Opens the device to query it; prefer [`Device::max_device_array_size_1d`]
/// on a device that is already open.
pub fn max_device_array_size_1d(config: &DeviceConfig, device_index: usize) -> Result<u32> {
    let config = DeviceConfig {
        device_index,
        ..config.clone()
    };
    Ok(Device::open(&config)?.max_device_array_size_1d())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device() -> Device {
        Device::open(&DeviceConfig {
            cpu_max_grid_dim_x: 4,
            max_threads_per_block: 512,
            ..DeviceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_device_creation() {
        let device = Device::new().unwrap();
        assert_eq!(device.backend_type(), BackendType::Cpu);
        assert_eq!(device.index(), 0);
        assert_eq!(device.max_device_array_size_1d(), 2_147_483_647);
    }

    #[test]
    fn test_cpu_rejects_other_indices() {
        assert!(matches!(
            max_device_array_size_1d(&DeviceConfig::default(), 1),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(max_device_array_size_1d(&DeviceConfig::default(), 0).unwrap(), 2_147_483_647);
    }

    #[test]
    fn test_new_auto_falls_back_to_cpu() {
        let device = Device::new_auto().unwrap();
        if !cfg!(feature = "cuda") {
            assert_eq!(device.backend_type(), BackendType::Cpu);
        }
    }

    #[test]
    fn test_launch_config_rounds_up() {
        let device = small_device();
        let config = device.launch_config_1d(257, 256).unwrap().unwrap();
        assert_eq!(config.grid.x, 2);
        assert_eq!(config.block.x, 256);
        assert!(device.launch_config_1d(0, 256).unwrap().is_none());
    }

    #[test]
    fn test_launch_config_capacity() {
        let device = small_device();
        assert!(device.launch_config_1d(1024, 256).unwrap().is_some());
        match device.launch_config_1d(1025, 256) {
            Err(Error::CapacityExceeded { requested, capacity }) => {
                assert_eq!(requested, 1025);
                assert_eq!(capacity, 1024);
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_launch_config_block_size_bounds() {
        let device = small_device();
        assert!(matches!(device.launch_config_1d(10, 0), Err(Error::InvalidLaunch(_))));
        assert!(matches!(device.launch_config_1d(10, 1024), Err(Error::InvalidLaunch(_))));
    }

    #[test]
    fn test_allocation_error() {
        let device = Device::open(&DeviceConfig {
            cpu_memory_limit_bytes: 1024,
            ..DeviceConfig::default()
        })
        .unwrap();
        let _held = device.allocate::<f32>(200).unwrap();
        assert!(matches!(
            device.allocate::<f32>(100),
            Err(Error::AllocationError { requested: 400, .. })
        ));
    }

    #[test]
    fn test_allocation_byte_count_overflow() {
        let device = Device::new().unwrap();
        assert!(matches!(
            device.allocate::<f32>(usize::MAX / 2),
            Err(Error::AllocationError { requested: usize::MAX, .. })
        ));
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_upload_download() {
        let device = Device::new().unwrap();
        let array = device.upload(&[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(device.allocated_bytes(), 12);
        assert_eq!(device.download(array).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(device.allocated_bytes(), 0);
    }
}
