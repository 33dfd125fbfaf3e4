//! Network container and feedforward orchestration
//!
//! A [`Network`] holds `L` [`Axon`]s, the shape vector `size_dims` (`L + 1`
//! entries), the batch size `m`, the input `X` (`size_dims[0] x m`) and the
//! labels `y` (`size_dims[L] x m`). All matrices are column-major with one
//! column per example.
//!
//! ```text
//! Uninitialized ──load_params──▶ ParamsLoaded ──load_input──▶ DataLoaded
//!                                                               │   ▲
//!                                                   feedforward │   │ reload / failed pass
//!                                                               ▼   │
//!                                                            FedForward
//! ```
//!
//! # Example
//!
//! ```
//! use feedfwd_core::{Activation, Device, Network, NetworkState};
//!
//! let device = Device::new()?;
//! let mut network = Network::new(device, &[2, 1], &[Activation::Sigmoid])?;
//! network.load_params(&[(vec![0.0f32, 0.0], vec![0.0f32])])?;
//! network.load_input(&[1.0, 2.0, 3.0, 4.0], 2)?;
//! network.feedforward(256)?;
//!
//! assert_eq!(network.state(), NetworkState::FedForward);
//! assert_eq!(network.final_output()?, vec![0.5, 0.5]);
//! # Ok::<(), feedfwd_core::Error>(())
//! ```

use std::time::Instant;

use crate::activation::Activation;
use crate::axon::Axon;
use crate::buffer::DeviceArray;
use crate::device::Device;
use crate::error::{element_count, Error, Result};
use crate::instrumentation::ExecutionMetrics;
use crate::ops;

/// Lifecycle of a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Parameters not yet loaded
    Uninitialized,
    /// Every layer has parameters, no input loaded
    ParamsLoaded,
    /// Parameters and input loaded, no valid pass
    DataLoaded,
    /// Layer outputs reflect the current parameters and input
    FedForward,
}

/// Deep feedforward network resident on one device
#[derive(Debug)]
pub struct Network {
    device: Device,
    axons: Vec<Axon>,
    size_dims: Vec<usize>,
    activations: Vec<Activation>,
    m: usize,
    input: Option<DeviceArray<f32>>,
    labels: Option<DeviceArray<f32>>,
    max_size_1darr: u32,
    fed_forward: bool,
}

impl Network {
    /// Build the layer structure; no device memory is allocated yet
    ///
    /// `size_dims` lists the unit counts of the input and every layer, so it
    /// has one more entry than `activations`.
    #[tracing::instrument(skip(device))]
    pub fn new(device: Device, size_dims: &[usize], activations: &[Activation]) -> Result<Self> {
        if size_dims.len() < 2 {
            return Err(Error::InvalidConfig(format!(
                "a network needs at least an input and one layer, got {} sizes",
                size_dims.len()
            )));
        }
        if activations.len() + 1 != size_dims.len() {
            return Err(Error::shape("activations", size_dims.len() - 1, activations.len()));
        }
        if let Some(position) = size_dims.iter().position(|&units| units == 0) {
            return Err(Error::InvalidConfig(format!("size_dims[{position}] is zero")));
        }

        let axons = size_dims
            .windows(2)
            .zip(activations)
            .map(|(dims, &activation)| Axon::new(dims[0], dims[1], activation))
            .collect();
        let max_size_1darr = device.max_device_array_size_1d();

        tracing::debug!(
            layers = activations.len(),
            max_size_1darr,
            device_index = device.index(),
            "network_created"
        );

        Ok(Self {
            device,
            axons,
            size_dims: size_dims.to_vec(),
            activations: activations.to_vec(),
            m: 0,
            input: None,
            labels: None,
            max_size_1darr,
            fed_forward: false,
        })
    }

    /// Like [`Network::new`] with host driver activation codes
    pub fn from_codes(device: Device, size_dims: &[usize], codes: &[i32]) -> Result<Self> {
        let activations = codes
            .iter()
            .map(|&code| Activation::try_from(code))
            .collect::<Result<Vec<_>>>()?;
        Self::new(device, size_dims, &activations)
    }

    // ============================================================================================
    // Shape and state
    // ============================================================================================

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of layers `L`
    pub fn num_layers(&self) -> usize {
        self.axons.len()
    }

    pub fn size_dims(&self) -> &[usize] {
        &self.size_dims
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    /// Batch size of the loaded input, 0 before any input
    pub fn batch_size(&self) -> usize {
        self.m
    }

    /// Maximum grid extent in x of the device, queried at construction
    pub fn max_size_1darr(&self) -> u32 {
        self.max_size_1darr
    }

    pub fn state(&self) -> NetworkState {
        let params_loaded = self.params_loaded();
        if params_loaded && self.fed_forward {
            NetworkState::FedForward
        } else if params_loaded && self.input.is_some() {
            NetworkState::DataLoaded
        } else if params_loaded {
            NetworkState::ParamsLoaded
        } else {
            NetworkState::Uninitialized
        }
    }

    fn params_loaded(&self) -> bool {
        self.axons.iter().all(Axon::has_params)
    }

    fn invalidate_outputs(&mut self) {
        self.fed_forward = false;
        for axon in &mut self.axons {
            axon.clear_outputs();
        }
    }

    // ============================================================================================
    // Loading
    // ============================================================================================

    /// Load `(theta, b)` for every layer, in layer order
    ///
    /// All pairs are validated and uploaded before any is installed; on error
    /// the previous parameters are untouched.
    #[tracing::instrument(skip(self, params), fields(pairs = params.len()))]
    pub fn load_params<T, B>(&mut self, params: &[(T, B)]) -> Result<()>
    where
        T: AsRef<[f32]>,
        B: AsRef<[f32]>,
    {
        let start = Instant::now();
        if params.len() != self.axons.len() {
            return Err(Error::shape("parameter pairs", self.axons.len(), params.len()));
        }
        for (axon, (theta, bias)) in self.axons.iter().zip(params) {
            axon.check_params(theta.as_ref().len(), bias.as_ref().len())?;
        }

        let mut staged = Vec::with_capacity(params.len());
        for (theta, bias) in params {
            staged.push((self.device.upload(theta.as_ref())?, self.device.upload(bias.as_ref())?));
        }

        for (axon, (theta, bias)) in self.axons.iter_mut().zip(staged) {
            axon.install_params(theta, bias);
        }
        self.fed_forward = false;

        ExecutionMetrics::new("load_params", params.len(), start).log();
        Ok(())
    }

    /// Load parameters from the alternating `[theta_1, b_1, theta_2, b_2, ...]` layout
    pub fn load_from_flat(&mut self, flat: &[Vec<f32>]) -> Result<()> {
        if flat.len() != 2 * self.axons.len() {
            return Err(Error::shape("flat parameter arrays", 2 * self.axons.len(), flat.len()));
        }
        let pairs: Vec<(&[f32], &[f32])> = flat
            .chunks_exact(2)
            .map(|pair| (pair[0].as_slice(), pair[1].as_slice()))
            .collect();
        self.load_params(&pairs)
    }

    /// Load the input matrix `X` (`size_dims[0] x m`)
    ///
    /// Labels loaded for a different batch size are dropped.
    #[tracing::instrument(skip(self, x), fields(elements = x.len()))]
    pub fn load_input(&mut self, x: &[f32], m: usize) -> Result<()> {
        if m == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".into()));
        }
        let expected = element_count("input X", self.size_dims[0], m, x.len())?;
        if x.len() != expected {
            return Err(Error::shape("input X", expected, x.len()));
        }

        let input = self.device.upload(x)?;
        if m != self.m && self.labels.take().is_some() {
            tracing::debug!(old_m = self.m, new_m = m, "labels_dropped");
        }
        self.input = Some(input);
        self.m = m;
        self.invalidate_outputs();
        Ok(())
    }

    /// Load the labels `y` (`size_dims[L] x m`); requires a loaded input
    #[tracing::instrument(skip(self, y), fields(elements = y.len()))]
    pub fn load_labels(&mut self, y: &[f32]) -> Result<()> {
        if self.input.is_none() {
            return Err(Error::not_ready("load the input before the labels"));
        }
        let expected = element_count("labels y", self.output_units(), self.m, y.len())?;
        if y.len() != expected {
            return Err(Error::shape("labels y", expected, y.len()));
        }
        self.labels = Some(self.device.upload(y)?);
        Ok(())
    }

    fn output_units(&self) -> usize {
        self.size_dims[self.size_dims.len() - 1]
    }

    // ============================================================================================
    // Feedforward
    // ============================================================================================

    /// Compute `a_l = act_l(theta_l * a_{l-1} + b_l)` for `l = 1..=L`
    ///
    /// Layers run strictly in order. If any step fails, every layer output is
    /// discarded and the network falls back to [`NetworkState::DataLoaded`].
    #[tracing::instrument(skip(self), fields(layers = self.axons.len(), m = self.m))]
    pub fn feedforward(&mut self, block_size: u32) -> Result<()> {
        if !self.params_loaded() {
            return Err(Error::not_ready("parameters not loaded"));
        }
        if self.input.is_none() {
            return Err(Error::not_ready("input not loaded"));
        }

        let start = Instant::now();
        self.invalidate_outputs();

        match self.run_layers(block_size) {
            Ok(()) => {
                self.fed_forward = true;
                ExecutionMetrics::new("feedforward", self.output_units().saturating_mul(self.m), start).log();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "feedforward aborted; layer outputs discarded");
                self.invalidate_outputs();
                Err(err)
            }
        }
    }

    fn run_layers(&mut self, block_size: u32) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::not_ready("input not loaded"))?;

        for l in 0..self.axons.len() {
            let (done, rest) = self.axons.split_at_mut(l);
            let previous = match done.last() {
                Some(axon) => axon
                    .output()
                    .ok_or_else(|| Error::not_ready(format!("layer {l} produced no output")))?,
                None => input,
            };
            rest[0].feed(&self.device, previous, self.m, block_size)?;
            tracing::debug!(layer = l + 1, "layer_fed_forward");
        }

        Ok(())
    }

    // ============================================================================================
    // Cost and gradient seed
    // ============================================================================================

    fn prediction_and_labels(&self) -> Result<(&DeviceArray<f32>, &DeviceArray<f32>)> {
        if !self.fed_forward {
            return Err(Error::not_ready("feedforward has not run"));
        }
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| Error::not_ready("labels not loaded"))?;
        let prediction = self
            .axons
            .last()
            .and_then(Axon::output)
            .ok_or_else(|| Error::not_ready("no final layer output"))?;
        Ok((prediction, labels))
    }

    /// Mean cross-entropy `J = sum(cost_xent(a_L, y)) / m`
    ///
    /// Predictions of exactly 0 or 1 make the result infinite or NaN.
    #[tracing::instrument(skip(self))]
    pub fn cost(&self, block_size: u32) -> Result<f32> {
        let (prediction, labels) = self.prediction_and_labels()?;
        let lx = prediction.len();

        let mut contributions = self.device.allocate::<f32>(lx)?;
        ops::loss::cost_xent(&self.device, lx, prediction, labels, &mut contributions, block_size)?;
        let contributions = self.device.download(contributions)?;

        let total: f64 = contributions.iter().map(|&c| f64::from(c)).sum();
        Ok((total / self.m as f64) as f32)
    }

    /// Gradient seed `delta_xent(a_L, y)`; the caller owns the returned array
    #[tracing::instrument(skip(self))]
    pub fn grad_seed(&self, block_size: u32) -> Result<DeviceArray<f32>> {
        let (prediction, labels) = self.prediction_and_labels()?;
        let lx = prediction.len();

        let mut delta = self.device.allocate::<f32>(lx)?;
        ops::loss::delta_xent(&self.device, lx, prediction, labels, &mut delta, block_size)?;
        Ok(delta)
    }

    // ============================================================================================
    // Readback
    // ============================================================================================

    /// Layer `l` (1-based)
    pub fn axon(&self, l: usize) -> Result<&Axon> {
        if l == 0 || l > self.axons.len() {
            return Err(Error::LayerOutOfRange {
                layer: l,
                layers: self.axons.len(),
            });
        }
        Ok(&self.axons[l - 1])
    }

    pub fn axons(&self) -> &[Axon] {
        &self.axons
    }

    /// Weight matrix of layer `l`, column-major `n_out x n_in`
    pub fn theta(&self, l: usize) -> Result<Vec<f32>> {
        self.axon(l)?
            .theta()
            .ok_or_else(|| Error::not_ready(format!("theta of layer {l} not loaded")))?
            .to_vec()
    }

    /// Bias of layer `l`
    pub fn bias(&self, l: usize) -> Result<Vec<f32>> {
        self.axon(l)?
            .bias()
            .ok_or_else(|| Error::not_ready(format!("bias of layer {l} not loaded")))?
            .to_vec()
    }

    /// Activation `a_l` of the last pass, `n_out x m`
    pub fn layer_output(&self, l: usize) -> Result<Vec<f32>> {
        self.axon(l)?
            .output()
            .ok_or_else(|| Error::not_ready(format!("layer {l} has no output; run feedforward")))?
            .to_vec()
    }

    /// Pre-activation `z_l` of the last pass
    pub fn pre_activation(&self, l: usize) -> Result<Vec<f32>> {
        self.axon(l)?
            .pre_activation()
            .ok_or_else(|| Error::not_ready(format!("layer {l} has no pre-activation; run feedforward")))?
            .to_vec()
    }

    /// `a_L`
    pub fn final_output(&self) -> Result<Vec<f32>> {
        self.layer_output(self.axons.len())
    }

    pub fn labels(&self) -> Result<Vec<f32>> {
        self.labels
            .as_ref()
            .ok_or_else(|| Error::not_ready("labels not loaded"))?
            .to_vec()
    }

    pub fn input(&self) -> Result<Vec<f32>> {
        self.input
            .as_ref()
            .ok_or_else(|| Error::not_ready("input not loaded"))?
            .to_vec()
    }
}
