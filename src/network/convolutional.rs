use std::time::SystemTime;

use ndarray::{Array1, Array3, ArrayView3};
use tracing::{debug, info, warn};

use super::state::{
    backward_layers, describe_layers, format_time, forward_layers, mean_squared_error, set_training, NetworkState,
};
use crate::activations::Activation;
use crate::config::{LearningConfig, MAX_NETWORK_LEARNING_RATE, MIN_NETWORK_LEARNING_RATE};
use crate::data::validate_pairs;
use crate::error::{check_len, LearningError, Result};
use crate::layers::conv::DEFAULT_INPUT_DIMS;
use crate::layers::{flatten_spatial, Conv2DLayer, DenseLayer, FlattenLayer, LayerShape, MaxPool2DLayer, NetworkLayer};
use crate::optimizer::AdvancedOptimizer;

pub const MAX_LAYERS: usize = 50;

/// Convolutional network over `(height, width, channels)` inputs.
///
/// Spatial layers (convolution and pooling) come first, then an optional
/// flatten step, then dense layers. A dense layer added first consumes the
/// flattened input directly.
#[derive(Debug, Clone)]
pub struct ConvolutionalNeuralNetwork {
    input_dims: (usize, usize, usize),
    layers: Vec<Box<dyn NetworkLayer>>,
    optimizer: AdvancedOptimizer,
    config: LearningConfig,
    state: NetworkState,
}

impl Default for ConvolutionalNeuralNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvolutionalNeuralNetwork {
    /// A network for 32x32 RGB inputs.
    pub fn new() -> Self {
        let config = LearningConfig::convolutional();
        ConvolutionalNeuralNetwork {
            input_dims: DEFAULT_INPUT_DIMS,
            layers: Vec::new(),
            optimizer: AdvancedOptimizer::new(config.optimizer, config.learning_rate),
            state: NetworkState::new(config.error_history_limit),
            config,
        }
    }

    pub fn with_input_shape(height: usize, width: usize, channels: usize) -> Result<Self> {
        if height == 0 || width == 0 || channels == 0 {
            return Err(LearningError::invalid_argument(format!(
                "input shape {}x{}x{} must be positive",
                height, width, channels
            )));
        }
        let mut network = Self::new();
        network.input_dims = (height, width, channels);
        Ok(network)
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        let config = config.normalized();
        self.optimizer = AdvancedOptimizer::new(config.optimizer, config.learning_rate);
        self.state.set_history_limit(config.error_history_limit);
        self.config = config;
        self
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn input_dims(&self) -> (usize, usize, usize) {
        self.input_dims
    }

    pub fn input_shape(&self) -> LayerShape {
        let (h, w, c) = self.input_dims;
        LayerShape::spatial(h, w, c)
    }

    fn current_shape(&self) -> LayerShape {
        self.layers.last().map(|l| l.output_shape()).unwrap_or_else(|| self.input_shape())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.state.is_active() {
            return Err(LearningError::illegal_state("cannot change layers of an active network"));
        }
        if self.layers.len() >= MAX_LAYERS {
            return Err(LearningError::illegal_state(format!("network already has {} layers", MAX_LAYERS)));
        }
        Ok(())
    }

    /// Spatial dims of the previous layer. Pooling and flatten need a spatial
    /// layer before them, so the raw input does not count.
    fn spatial_predecessor(&self) -> Result<(usize, usize, usize)> {
        self.layers
            .last()
            .and_then(|l| l.output_shape().dims())
            .ok_or_else(|| LearningError::illegal_state("layer needs a spatial layer before it"))
    }

    /// Add a ReLU convolution.
    pub fn add_conv2d_layer(&mut self, filters: usize, kernel_size: usize, stride: usize, padding: usize) -> bool {
        let result = self.try_add_conv2d_layer(filters, kernel_size, stride, padding);
        self.report_add(result)
    }

    pub fn try_add_conv2d_layer(
        &mut self,
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<()> {
        self.check_mutable()?;
        let dims = self
            .current_shape()
            .dims()
            .ok_or_else(|| LearningError::illegal_state("convolution cannot follow a flat layer"))?;
        let layer = Conv2DLayer::new(dims, filters, kernel_size, stride, padding)?.with_activation(Activation::Relu);
        self.push(Box::new(layer));
        Ok(())
    }

    pub fn add_max_pooling_layer(&mut self, pool_size: usize, stride: usize) -> bool {
        let result = self.try_add_max_pooling_layer(pool_size, stride);
        self.report_add(result)
    }

    pub fn try_add_max_pooling_layer(&mut self, pool_size: usize, stride: usize) -> Result<()> {
        self.check_mutable()?;
        let dims = self.spatial_predecessor()?;
        let layer = MaxPool2DLayer::new(dims, pool_size, stride)?;
        self.push(Box::new(layer));
        Ok(())
    }

    pub fn add_flatten_layer(&mut self) -> bool {
        let result = self.try_add_flatten_layer();
        self.report_add(result)
    }

    pub fn try_add_flatten_layer(&mut self) -> Result<()> {
        self.check_mutable()?;
        let dims = self.spatial_predecessor()?;
        self.push(Box::new(FlattenLayer::new(dims)));
        Ok(())
    }

    pub fn add_dense_layer(&mut self, neurons: usize, activation: Activation) -> bool {
        let result = self.try_add_dense_layer(neurons, activation);
        self.report_add(result)
    }

    pub fn try_add_dense_layer(&mut self, neurons: usize, activation: Activation) -> Result<()> {
        self.check_mutable()?;
        let width = match (self.layers.last(), self.current_shape()) {
            (None, shape) => shape.size(),
            (Some(_), LayerShape::Flat(n)) => n,
            (Some(_), shape) => {
                return Err(LearningError::illegal_state(format!(
                    "dense layer needs a flat input, previous layer outputs {}",
                    shape
                )))
            }
        };
        let layer = DenseLayer::new(width, neurons, activation)?;
        self.push(Box::new(layer));
        Ok(())
    }

    fn push(&mut self, mut layer: Box<dyn NetworkLayer>) {
        layer.set_training(false);
        debug!(kind = %layer.kind(), output = %layer.output_shape(), "layer added");
        self.layers.push(layer);
    }

    fn report_add(&self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "layer rejected");
                false
            }
        }
    }

    /// Drop every layer, deactivate and forget the training record.
    pub fn clear_layers(&mut self) {
        self.layers.clear();
        self.optimizer.reset();
        self.state.set_active(false);
        self.state.reset_counters();
    }

    pub fn activate(&mut self) -> bool {
        if self.layers.is_empty() {
            warn!("cannot activate a network without layers");
            return false;
        }
        self.state.set_active(true);
        info!(architecture = %self.architecture(), "convolutional network activated");
        true
    }

    pub fn deactivate(&mut self) {
        self.state.set_active(false);
        info!("convolutional network deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn forward(&mut self, input: ArrayView3<f32>) -> Option<Array1<f32>> {
        match self.try_forward(input) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(error = %e, "convolutional forward failed");
                None
            }
        }
    }

    /// The output is always flat; a trailing spatial layer is flattened
    /// height-major.
    pub fn try_forward(&mut self, input: ArrayView3<f32>) -> Result<Array1<f32>> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("convolutional network is not active"));
        }
        let flat = self.flatten_input(input)?;
        forward_layers(&mut self.layers, flat.view())
    }

    fn flatten_input(&self, input: ArrayView3<f32>) -> Result<Array1<f32>> {
        if input.dim() != self.input_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.input_dims),
                format!("{:?}", input.dim()),
            ));
        }
        Ok(flatten_spatial(&input.to_owned()))
    }

    pub fn train(&mut self, inputs: &[Array3<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        match self.try_train(inputs, targets, epochs) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "convolutional training failed");
                false
            }
        }
    }

    pub fn try_train(&mut self, inputs: &[Array3<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("convolutional network is not active"));
        }
        validate_pairs(inputs, targets)?;
        let output_size = self.current_shape().size();
        let mut flat_inputs = Vec::with_capacity(inputs.len());
        for (x, y) in inputs.iter().zip(targets) {
            flat_inputs.push(self.flatten_input(x.view())?);
            check_len("target", output_size, y.len())?;
        }

        set_training(&mut self.layers, true);
        let result = self.run_epochs(&flat_inputs, targets, epochs);
        set_training(&mut self.layers, false);
        result?;

        self.state.finish_training();
        info!(epochs, error = self.state.current_error(), "convolutional training completed");
        Ok(())
    }

    fn run_epochs(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        for epoch in 0..epochs {
            let mut total = 0.0;
            for (x, y) in inputs.iter().zip(targets) {
                let output = forward_layers(&mut self.layers, x.view())?;
                total += mean_squared_error(&output, y.view())?;
                let scale = 2.0 / output.len() as f32;
                let gradient = (&output - y) * scale;
                backward_layers(&mut self.layers, gradient)?;
                self.optimizer.update_weights(&mut self.layers);
            }
            let error = total / inputs.len() as f32;
            self.state.record_epoch(error);
            if (epoch + 1) % 10 == 0 {
                debug!(epoch = epoch + 1, error, "convolutional training progress");
            }
        }
        Ok(())
    }

    pub fn optimizer(&self) -> &AdvancedOptimizer {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut AdvancedOptimizer {
        &mut self.optimizer
    }

    pub fn set_optimizer(&mut self, optimizer: AdvancedOptimizer) {
        self.optimizer = optimizer;
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    /// Clamped to `[1e-4, 1]`.
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        if learning_rate.is_finite() {
            self.optimizer
                .set_learning_rate(learning_rate.clamp(MIN_NETWORK_LEARNING_RATE, MAX_NETWORK_LEARNING_RATE));
        }
    }

    pub fn output_size(&self) -> usize {
        self.current_shape().size()
    }

    pub fn layers(&self) -> &[Box<dyn NetworkLayer>] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn training_epochs(&self) -> u64 {
        self.state.training_epochs()
    }

    pub fn current_error(&self) -> f32 {
        self.state.current_error()
    }

    pub fn error_history(&self) -> Vec<f32> {
        self.state.error_history()
    }

    pub fn last_training_time(&self) -> Option<SystemTime> {
        self.state.last_training_time()
    }

    pub fn architecture(&self) -> String {
        format!(
            "ConvolutionalNeuralNetwork[{} -> {}]",
            self.input_shape(),
            describe_layers(&self.layers)
        )
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== ConvolutionalNeuralNetwork Statistics ===\n");
        stats.push_str(&format!("Architecture: {}\n", self.architecture()));
        stats.push_str(&format!("Input Shape: {}\n", self.input_shape()));
        stats.push_str(&format!("Output Size: {}\n", self.output_size()));
        stats.push_str(&format!("Layers: {}\n", self.layers.len()));
        stats.push_str(&format!("Parameters: {}\n", self.parameter_count()));
        stats.push_str(&format!("Active: {}\n", self.state.is_active()));
        stats.push_str(&format!("Optimizer: {}\n", self.optimizer.kind()));
        stats.push_str(&format!("Learning Rate: {:.6}\n", self.optimizer.learning_rate()));
        stats.push_str(&format!("Training Epochs: {}\n", self.state.training_epochs()));
        stats.push_str(&format!("Current Error: {:.6}\n", self.state.current_error()));
        stats.push_str(&format!("Last Training: {}\n", format_time(self.state.last_training_time())));
        stats
    }
}
