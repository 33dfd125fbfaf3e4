//! Core types for backend execution

use std::fmt;

use crate::error::{BackendError, Result};

// ================================================================================================
// Handles
// ================================================================================================

/// Opaque handle to a device buffer
///
/// Handles are only meaningful to the backend that issued them. Freeing a
/// handle invalidates it; the backend never reuses an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Create a new buffer handle
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw handle ID
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

// ================================================================================================
// Device properties
// ================================================================================================

/// Static properties of the device a backend drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Human readable device name
    pub name: String,
    /// Maximum number of blocks in the x dimension of a grid
    pub max_grid_dim_x: u32,
    /// Maximum number of lanes in one block
    pub max_threads_per_block: u32,
    /// Device memory available to the allocator, in bytes
    pub total_memory: usize,
    /// Largest length a kernel's length argument can express
    pub max_kernel_len: usize,
}

impl DeviceProperties {
    /// Largest 1-D task count a single launch can cover with `block_size` lanes per block
    ///
    /// Bounded by both the grid extent and [`DeviceProperties::max_kernel_len`].
    pub fn max_tasks_1d(&self, block_size: u32) -> usize {
        (self.max_grid_dim_x as usize)
            .saturating_mul(block_size as usize)
            .min(self.max_kernel_len)
    }
}

// ================================================================================================
// Launch geometry
// ================================================================================================

/// Grid dimensions (number of blocks)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridDim {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 1-D grid
    pub const fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub const fn total_blocks(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self::linear(1)
    }
}

/// Block dimensions (lanes per block)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl BlockDim {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 1-D block
    pub const fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub const fn total_lanes(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for BlockDim {
    fn default() -> Self {
        Self::linear(256)
    }
}

/// Kernel launch configuration
///
/// All kernels in this crate are one-dimensional: `y` and `z` of both grid
/// and block must be 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchConfig {
    pub grid: GridDim,
    pub block: BlockDim,
}

impl LaunchConfig {
    pub const fn new(grid: GridDim, block: BlockDim) -> Self {
        Self { grid, block }
    }

    /// 1-D launch of `blocks` blocks with `block_size` lanes each
    pub const fn linear(blocks: u32, block_size: u32) -> Self {
        Self {
            grid: GridDim::linear(blocks),
            block: BlockDim::linear(block_size),
        }
    }

    /// Total number of lanes the launch spawns
    pub const fn total_lanes(&self) -> u64 {
        self.grid.total_blocks() * self.block.total_lanes()
    }

    /// Check that this launch can run on `properties` and covers `tasks` logical tasks
    pub fn validate(&self, tasks: usize, properties: &DeviceProperties) -> Result<()> {
        if self.grid.y != 1 || self.grid.z != 1 || self.block.y != 1 || self.block.z != 1 {
            return Err(BackendError::invalid_launch(format!(
                "only 1-D launches are supported, got grid {:?} block {:?}",
                self.grid, self.block
            )));
        }
        if self.block.x == 0 || self.block.x > properties.max_threads_per_block {
            return Err(BackendError::invalid_launch(format!(
                "block size {} outside 1..={}",
                self.block.x, properties.max_threads_per_block
            )));
        }
        if self.grid.x > properties.max_grid_dim_x {
            return Err(BackendError::invalid_launch(format!(
                "grid size {} exceeds device limit {}",
                self.grid.x, properties.max_grid_dim_x
            )));
        }
        if tasks > properties.max_kernel_len {
            return Err(BackendError::invalid_launch(format!(
                "{} tasks exceed the kernel length limit {}",
                tasks, properties.max_kernel_len
            )));
        }
        if self.total_lanes() < tasks as u64 {
            return Err(BackendError::invalid_launch(format!(
                "{} lanes cannot cover {} tasks",
                self.total_lanes(),
                tasks
            )));
        }
        Ok(())
    }
}

/// Position of a single lane inside a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub block_idx: u32,
    pub lane_idx: u32,
    pub block_dim: u32,
}

impl ExecutionContext {
    pub const fn new(block_idx: u32, lane_idx: u32, block_dim: u32) -> Self {
        Self {
            block_idx,
            lane_idx,
            block_dim,
        }
    }

    /// `block_idx * block_dim + lane_idx`
    pub const fn global_index(&self) -> usize {
        self.block_idx as usize * self.block_dim as usize + self.lane_idx as usize
    }
}
