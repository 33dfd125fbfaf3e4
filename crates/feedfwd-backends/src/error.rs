//! Error types for backend operations

use std::fmt;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while managing device memory or launching work
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Device allocator could not satisfy the request
    #[error("out of device memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },

    /// Invalid launch configuration
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// A kernel was asked to write into one of its own inputs
    #[error("kernel {kernel} writes buffer {handle} that it also reads")]
    AliasedBuffers { kernel: &'static str, handle: u64 },

    /// Device or driver failure (CUDA driver, NVRTC, cuBLAS)
    #[error("device error: {0}")]
    Driver(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl BackendError {
    /// Create an invalid launch configuration error
    pub fn invalid_launch(msg: impl Into<String>) -> Self {
        Self::InvalidLaunchConfig(msg.into())
    }

    /// Wrap a driver-level error
    pub fn driver(context: &str, err: impl fmt::Display) -> Self {
        Self::Driver(format!("{context}: {err}"))
    }
}
