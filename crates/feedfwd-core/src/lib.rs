//! # feedfwd-core - deep feedforward networks on a parallel accelerator
//!
//! The forward pass of a fully connected network with every matrix resident
//! on the device:
//!
//! ```text
//! a_0 = X
//! a_l = act_l(theta_l * a_{l-1} + b_l)      l = 1..=L
//! ```
//!
//! ## Architecture
//!
//! - [`Device`] opens a backend (CPU reference or CUDA) and caches its
//!   properties, including the maximum 1-D grid extent
//! - [`DeviceArray<T>`] is a move-only owner of one device buffer, released
//!   exactly once on drop or through [`DeviceArray::release`]
//! - [`ops`] wraps the kernel set: `set_const_val`, `cost_xent`,
//!   `delta_xent`, `hadamard_multiply`, activations and sgemm
//! - [`Axon`] is one layer; [`Network`] holds the layers, input and labels
//!   and runs the pass
//!
//! ## Example
//!
//! ```
//! use feedfwd_core::{Activation, Device, Network, DEFAULT_BLOCK_SIZE};
//!
//! let device = Device::new()?;
//! let mut network = Network::new(device, &[3, 4, 2], &[Activation::Tanh, Activation::Sigmoid])?;
//!
//! network.load_from_flat(&[vec![0.1; 12], vec![0.0; 4], vec![-0.2; 8], vec![0.05; 2]])?;
//! network.load_input(&[0.5; 3 * 5], 5)?;
//! network.load_labels(&[1.0f32, 0.0].repeat(5))?;
//! network.feedforward(DEFAULT_BLOCK_SIZE)?;
//!
//! let a_l = network.final_output()?;
//! assert_eq!(a_l.len(), 2 * 5);
//! let cost = network.cost(DEFAULT_BLOCK_SIZE)?;
//! assert!(cost.is_finite() && cost > 0.0);
//! # Ok::<(), feedfwd_core::Error>(())
//! ```

pub mod activation;
pub mod axon;
pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod instrumentation;
pub mod network;
pub mod ops;

pub use activation::Activation;
pub use axon::Axon;
pub use buffer::DeviceArray;
pub use config::{BackendType, DeviceConfig};
pub use device::{max_device_array_size_1d, Device, DEFAULT_BLOCK_SIZE};
pub use error::{Error, Result};
pub use network::{Network, NetworkState};

pub use feedfwd_backends::DeviceProperties;
