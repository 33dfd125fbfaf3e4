//! Backend trait, handles, launch geometry and kernel descriptors

mod kernel;
mod traits;
mod types;

pub use kernel::{GemmParams, Kernel, UnaryOp};
pub use traits::Backend;
pub use types::{BlockDim, BufferHandle, DeviceProperties, ExecutionContext, GridDim, LaunchConfig};
