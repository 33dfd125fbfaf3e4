//! A single fully connected layer on the device
//!
//! An [`Axon`] owns its weight matrix `theta` (`n_out x n_in`, column-major),
//! its bias `b` (`n_out`) and, after a pass, the pre-activation `z` and the
//! activation `a` (both `n_out x m`). Parameters change only through explicit
//! loads; `z` and `a` are replaced on every pass.

use std::time::Instant;

use crate::activation::Activation;
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::{element_count, Error, Result};
use crate::instrumentation::ExecutionMetrics;
use crate::ops;

/// One layer: `a = act(theta * a_prev + b)`
#[derive(Debug)]
pub struct Axon {
    n_in: usize,
    n_out: usize,
    activation: Activation,
    theta: Option<DeviceArray<f32>>,
    bias: Option<DeviceArray<f32>>,
    pre_activation: Option<DeviceArray<f32>>,
    output: Option<DeviceArray<f32>>,
}

impl Axon {
    /// A layer mapping `n_in` units to `n_out` units, without parameters
    pub fn new(n_in: usize, n_out: usize, activation: Activation) -> Self {
        Self {
            n_in,
            n_out,
            activation,
            theta: None,
            bias: None,
            pre_activation: None,
            output: None,
        }
    }

    pub fn n_in(&self) -> usize {
        self.n_in
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn has_params(&self) -> bool {
        self.theta.is_some() && self.bias.is_some()
    }

    pub fn theta(&self) -> Option<&DeviceArray<f32>> {
        self.theta.as_ref()
    }

    pub fn bias(&self) -> Option<&DeviceArray<f32>> {
        self.bias.as_ref()
    }

    /// `z` of the last successful pass
    pub fn pre_activation(&self) -> Option<&DeviceArray<f32>> {
        self.pre_activation.as_ref()
    }

    /// `a` of the last successful pass
    pub fn output(&self) -> Option<&DeviceArray<f32>> {
        self.output.as_ref()
    }

    /// Move the activation out of the layer
    pub fn take_output(&mut self) -> Option<DeviceArray<f32>> {
        self.output.take()
    }

    /// Check host parameter lengths against the layer shape
    pub fn check_params(&self, theta_len: usize, bias_len: usize) -> Result<()> {
        let expected = element_count("theta", self.n_out, self.n_in, theta_len)?;
        if theta_len != expected {
            return Err(Error::shape(
                format!("theta ({} x {})", self.n_out, self.n_in),
                expected,
                theta_len,
            ));
        }
        if bias_len != self.n_out {
            return Err(Error::shape("bias", self.n_out, bias_len));
        }
        Ok(())
    }

    /// Validate, upload and install `theta` and `b`
    ///
    /// On any failure the previous parameters stay in place.
    pub fn load_params(&mut self, device: &Device, theta: &[f32], bias: &[f32]) -> Result<()> {
        self.check_params(theta.len(), bias.len())?;
        let theta = device.upload(theta)?;
        let bias = device.upload(bias)?;
        self.install_params(theta, bias);
        Ok(())
    }

    /// Swap in already uploaded parameters; stale outputs are dropped
    pub(crate) fn install_params(&mut self, theta: DeviceArray<f32>, bias: DeviceArray<f32>) {
        self.theta = Some(theta);
        self.bias = Some(bias);
        self.clear_outputs();
    }

    pub(crate) fn clear_outputs(&mut self) {
        self.pre_activation = None;
        self.output = None;
    }

    /// `z = theta * input + b`, with `b` broadcast over the `m` columns
    ///
    /// The bias is written first as the rank-1 product `b * 1ᵀ`; the main
    /// product then accumulates into it with `beta = 1`.
    #[tracing::instrument(skip(self, device, input), fields(n_in = self.n_in, n_out = self.n_out))]
    pub fn apply_linear(
        &self,
        device: &Device,
        input: &DeviceArray<f32>,
        m: usize,
        block_size: u32,
    ) -> Result<DeviceArray<f32>> {
        let theta = self
            .theta
            .as_ref()
            .ok_or_else(|| Error::not_ready("layer parameters not loaded"))?;
        let bias = self
            .bias
            .as_ref()
            .ok_or_else(|| Error::not_ready("layer parameters not loaded"))?;
        let expected = element_count("layer input", self.n_in, m, input.len())?;
        if input.len() != expected {
            return Err(Error::shape("layer input", expected, input.len()));
        }
        let z_len = element_count("pre-activation", self.n_out, m, 0)?;

        let mut ones = device.allocate::<f32>(m)?;
        ops::memory::set_const_val(device, m, 1.0, &mut ones, block_size)?;

        let mut z = device.allocate::<f32>(z_len)?;
        ops::linalg::gemm(device, self.n_out, m, 1, 1.0, bias, &ones, 0.0, &mut z)?;
        ops::linalg::gemm(device, self.n_out, m, self.n_in, 1.0, theta, input, 1.0, &mut z)?;

        ones.release()?;
        Ok(z)
    }

    /// `a = act(z)`; keeps both `z` and `a` on the layer
    #[tracing::instrument(skip(self, device, z), fields(activation = %self.activation))]
    pub fn apply_activation(
        &mut self,
        device: &Device,
        z: DeviceArray<f32>,
        m: usize,
        block_size: u32,
    ) -> Result<&DeviceArray<f32>> {
        let expected = element_count("pre-activation", self.n_out, m, z.len())?;
        if z.len() != expected {
            return Err(Error::shape("pre-activation", expected, z.len()));
        }

        let mut a = device.allocate::<f32>(expected)?;
        ops::activation::apply(device, self.activation, &z, &mut a, self.n_out, m, block_size)?;

        self.pre_activation = Some(z);
        Ok(self.output.insert(a))
    }

    /// Linear step then activation, reading only `input`
    pub fn feed(&mut self, device: &Device, input: &DeviceArray<f32>, m: usize, block_size: u32) -> Result<()> {
        let start = Instant::now();
        self.clear_outputs();
        let z = self.apply_linear(device, input, m, block_size)?;
        self.apply_activation(device, z, m, block_size)?;
        ExecutionMetrics::new("layer_fed_forward", self.n_out.saturating_mul(m), start).log();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_linear_broadcasts_bias() {
        let device = Device::new().unwrap();
        let mut axon = Axon::new(2, 2, Activation::Identity);
        // theta = [[1, 2], [3, 4]] column-major
        axon.load_params(&device, &[1.0, 3.0, 2.0, 4.0], &[10.0, 20.0]).unwrap();

        // Two examples: (1, 0) and (0, 1)
        let input = device.upload(&[1.0f32, 0.0, 0.0, 1.0]).unwrap();
        let z = axon.apply_linear(&device, &input, 2, 256).unwrap();
        assert_eq!(z.to_vec().unwrap(), vec![11.0, 23.0, 12.0, 24.0]);
    }

    #[test]
    fn test_apply_linear_requires_params() {
        let device = Device::new().unwrap();
        let axon = Axon::new(2, 1, Activation::Sigmoid);
        let input = device.upload(&[1.0f32, 1.0]).unwrap();
        assert!(matches!(
            axon.apply_linear(&device, &input, 1, 256),
            Err(Error::NotReady(_))
        ));
    }

    #[test]
    fn test_load_params_shape_mismatch_keeps_previous() {
        let device = Device::new().unwrap();
        let mut axon = Axon::new(2, 1, Activation::Identity);
        axon.load_params(&device, &[1.0, 2.0], &[0.5]).unwrap();

        assert!(matches!(
            axon.load_params(&device, &[1.0, 2.0, 3.0], &[0.5]),
            Err(Error::ShapeMismatch { expected: 2, actual: 3, .. })
        ));
        assert!(matches!(
            axon.load_params(&device, &[1.0, 2.0], &[]),
            Err(Error::ShapeMismatch { expected: 1, actual: 0, .. })
        ));
        assert_eq!(axon.theta().unwrap().to_vec().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_feed_stores_pre_activation_and_output() {
        let device = Device::new().unwrap();
        let mut axon = Axon::new(1, 1, Activation::Relu);
        axon.load_params(&device, &[2.0], &[-1.0]).unwrap();

        let input = device.upload(&[0.0f32, 3.0]).unwrap();
        axon.feed(&device, &input, 2, 256).unwrap();
        assert_eq!(axon.pre_activation().unwrap().to_vec().unwrap(), vec![-1.0, 5.0]);
        assert_eq!(axon.output().unwrap().to_vec().unwrap(), vec![0.0, 5.0]);

        let taken = axon.take_output().unwrap();
        assert_eq!(taken.len(), 2);
        assert!(axon.output().is_none());
    }

    #[test]
    fn test_feed_releases_temporaries() {
        let device = Device::new().unwrap();
        let mut axon = Axon::new(3, 2, Activation::Tanh);
        axon.load_params(&device, &[0.1; 6], &[0.0; 2]).unwrap();
        let input = device.upload(&[1.0f32; 12]).unwrap();
        axon.feed(&device, &input, 4, 256).unwrap();

        // theta + b + input + z + a
        let floats = 6 + 2 + 12 + 8 + 8;
        assert_eq!(device.allocated_bytes(), floats * std::mem::size_of::<f32>());
    }

    #[test]
    fn test_overflowing_shapes_are_rejected() {
        let huge = usize::MAX / 2;
        let axon = Axon::new(huge, 3, Activation::Identity);
        assert!(matches!(
            axon.check_params(6, 3),
            Err(Error::ShapeMismatch { expected: usize::MAX, actual: 6, .. })
        ));

        let device = Device::new().unwrap();
        let mut axon = Axon::new(3, 1, Activation::Identity);
        axon.load_params(&device, &[1.0; 3], &[0.0]).unwrap();
        let input = device.upload(&[1.0f32; 4]).unwrap();
        assert!(matches!(
            axon.apply_linear(&device, &input, huge, 256),
            Err(Error::ShapeMismatch { expected: usize::MAX, .. })
        ));
        assert_eq!(device.allocated_bytes(), (3 + 1 + 4) * std::mem::size_of::<f32>());
    }
}
