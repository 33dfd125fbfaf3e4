//! Error types for the network core

use feedfwd_backends::BackendError;

/// Result type for network core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, running or reading back a network
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host data length does not match the declared shape
    #[error("shape mismatch for {what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// The device allocator could not satisfy a request
    #[error("device allocation of {requested} bytes failed: {reason}")]
    AllocationError { requested: usize, reason: String },

    /// Host/device copy with mismatched element counts
    #[error("transfer size mismatch: device array holds {expected} elements, host slice has {actual}")]
    TransferError { expected: usize, actual: usize },

    /// The 1-D launch would need more blocks than the device allows
    #[error("launch of {requested} elements exceeds 1-D device capacity of {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// An operation was called before its prerequisite load or pass
    #[error("not ready: {0}")]
    NotReady(String),

    /// 1-based layer index outside `1..=layers`
    #[error("layer {layer} out of range 1..={layers}")]
    LayerOutOfRange { layer: usize, layers: usize },

    /// Invalid configuration (network shape, activation code, device selection)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid kernel launch parameters
    #[error("invalid launch: {0}")]
    InvalidLaunch(String),

    /// Backend error
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }
}

/// `rows * cols`, or `ShapeMismatch` against `actual` when the product overflows
pub(crate) fn element_count(what: &str, rows: usize, cols: usize, actual: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| Error::ShapeMismatch {
        what: format!("{what} ({rows} x {cols} overflows usize)"),
        expected: usize::MAX,
        actual,
    })
}
