use std::time::SystemTime;

use ndarray::{Array1, ArrayView1};
use tracing::{debug, info, warn};

use super::state::{
    backward_layers, describe_layers, format_time, forward_layers, mean_squared_error, set_training, NetworkState,
};
use crate::activations::Activation;
use crate::config::{LearningConfig, MAX_NETWORK_LEARNING_RATE, MIN_NETWORK_LEARNING_RATE};
use crate::data::TrainingData;
use crate::error::{check_len, check_range, LearningError, Result};
use crate::layers::dense::{MAX_NEURONS, MIN_NEURONS};
use crate::layers::{BatchNormLayer, DenseLayer, DropoutLayer, LayerShape, NetworkLayer};
use crate::optimizer::AdvancedOptimizer;

pub const MAX_LAYERS: usize = 50;

/// Learning rate multiplier used by [`DeepNeuralNetwork::adapt`]
pub const ADAPT_RATE_FACTOR: f32 = 0.1;

/// Number of recent epoch errors shown in [`DeepNeuralNetwork::statistics`]
const STATISTICS_ERRORS: usize = 10;

/// A configurable stack of flat layers trained with an [`AdvancedOptimizer`].
///
/// Layers can only be added or removed while the network is inactive. Each
/// new layer must accept the output width of the previous one (or the
/// network input for the first layer).
#[derive(Debug, Clone)]
pub struct DeepNeuralNetwork {
    input_size: usize,
    layers: Vec<Box<dyn NetworkLayer>>,
    optimizer: AdvancedOptimizer,
    config: LearningConfig,
    state: NetworkState,
}

impl DeepNeuralNetwork {
    pub fn new(input_size: usize) -> Result<Self> {
        check_range("input size", input_size, MIN_NEURONS, MAX_NEURONS)?;
        let config = LearningConfig::deep();
        Ok(DeepNeuralNetwork {
            input_size,
            layers: Vec::new(),
            optimizer: AdvancedOptimizer::new(config.optimizer, config.learning_rate),
            state: NetworkState::new(config.error_history_limit),
            config,
        })
    }

    /// Replace the training configuration. The optimizer is rebuilt from it.
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

    /// Width the next layer must accept
    fn next_input_size(&self) -> usize {
        self.layers.last().map(|l| l.output_size()).unwrap_or(self.input_size)
    }

    /// Append a prebuilt layer.
    pub fn add_layer(&mut self, layer: Box<dyn NetworkLayer>) -> bool {
        match self.try_add_layer(layer) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "layer rejected");
                false
            }
        }
    }

    pub fn try_add_layer(&mut self, mut layer: Box<dyn NetworkLayer>) -> Result<()> {
        if self.state.is_active() {
            return Err(LearningError::illegal_state("cannot add layers to an active network"));
        }
        if self.layers.len() >= MAX_LAYERS {
            return Err(LearningError::illegal_state(format!("network already has {} layers", MAX_LAYERS)));
        }
        let expected = LayerShape::Flat(self.next_input_size());
        if layer.input_shape() != expected {
            return Err(LearningError::dimension_mismatch(
                format!("{} layer input", expected),
                format!("{}", layer.input_shape()),
            ));
        }

        layer.set_training(false);
        debug!(kind = %layer.kind(), output = layer.output_size(), "layer added");
        self.layers.push(layer);
        Ok(())
    }

    pub fn add_dense_layer(&mut self, neurons: usize, activation: Activation) -> bool {
        self.add_built(DenseLayer::new(self.next_input_size(), neurons, activation))
    }

    pub fn add_dropout_layer(&mut self, rate: f32) -> bool {
        self.add_built(DropoutLayer::new(self.next_input_size(), rate))
    }

    pub fn add_batch_norm_layer(&mut self) -> bool {
        self.add_built(BatchNormLayer::new(self.next_input_size()))
    }

    fn add_built<L: NetworkLayer + 'static>(&mut self, layer: Result<L>) -> bool {
        match layer {
            Ok(layer) => self.add_layer(Box::new(layer)),
            Err(e) => {
                warn!(error = %e, "layer construction failed");
                false
            }
        }
    }

    pub fn remove_last_layer(&mut self) -> bool {
        if self.state.is_active() || self.layers.is_empty() {
            return false;
        }
        self.layers.pop();
        // moments are keyed by layer position
        self.optimizer.reset();
        true
    }

    /// Drop every layer and deactivate.
    pub fn clear_layers(&mut self) {
        self.layers.clear();
        self.optimizer.reset();
        self.state.set_active(false);
    }

    pub fn activate(&mut self) -> bool {
        if self.layers.is_empty() {
            warn!("cannot activate a network without layers");
            return false;
        }
        self.state.set_active(true);
        info!(architecture = %self.architecture(), "deep neural network activated");
        true
    }

    pub fn deactivate(&mut self) {
        self.state.set_active(false);
        info!("deep neural network deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn forward(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        match self.try_forward(input) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(error = %e, "deep network forward failed");
                None
            }
        }
    }

    pub fn try_forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.ensure_active()?;
        check_len("input", self.input_size, input.len())?;
        forward_layers(&mut self.layers, input)
    }

    /// Run one sample forward and back, accumulating gradients without
    /// updating weights. Returns `target - output`.
    pub fn backward(&mut self, input: ArrayView1<f32>, target: ArrayView1<f32>) -> Option<Array1<f32>> {
        match self.try_backward(input, target) {
            Ok(error) => Some(error),
            Err(e) => {
                warn!(error = %e, "deep network backward failed");
                None
            }
        }
    }

    pub fn try_backward(&mut self, input: ArrayView1<f32>, target: ArrayView1<f32>) -> Result<Array1<f32>> {
        let output = self.try_forward(input)?;
        check_len("target", output.len(), target.len())?;
        let gradient = &output - &target;
        backward_layers(&mut self.layers, gradient.clone())?;
        Ok(-gradient)
    }

    /// Train with the configured epoch limit, error target and patience.
    pub fn train(&mut self, data: &TrainingData) -> bool {
        let result = self.try_train(data, self.config.max_epochs, true);
        report(result)
    }

    /// Train for exactly `epochs` epochs.
    pub fn train_for(&mut self, data: &TrainingData, epochs: usize) -> bool {
        let result = self.try_train(data, epochs, false);
        report(result)
    }

    /// Returns the number of epochs run. With `early_stop` the loop ends
    /// once the error reaches `min_error` or stops improving for `patience`
    /// epochs.
    pub fn try_train(&mut self, data: &TrainingData, epochs: usize, early_stop: bool) -> Result<usize> {
        self.ensure_active()?;
        data.validate()?;
        let output_size = self.next_input_size();
        for (x, y) in data.iter() {
            check_len("input", self.input_size, x.len())?;
            check_len("target", output_size, y.len())?;
        }

        set_training(&mut self.layers, true);
        let result = self.run_epochs(data, epochs, early_stop);
        set_training(&mut self.layers, false);
        let run = result?;

        self.state.finish_training();
        info!(epochs = run, error = self.state.current_error(), "deep network training completed");
        Ok(run)
    }

    fn run_epochs(&mut self, data: &TrainingData, epochs: usize, early_stop: bool) -> Result<usize> {
        let mut best = f32::INFINITY;
        let mut stale = 0;
        let mut run = 0;

        while run < epochs {
            let mut total = 0.0;
            for (x, y) in data.iter() {
                let output = forward_layers(&mut self.layers, x.view())?;
                total += mean_squared_error(&output, y.view())?;
                backward_layers(&mut self.layers, &output - y)?;
                self.optimizer.update_weights(&mut self.layers);
            }
            let error = total / data.len() as f32;
            self.state.record_epoch(error);
            run += 1;

            if run % 100 == 0 {
                debug!(epoch = run, error, "deep network training progress");
            }
            if !early_stop {
                continue;
            }
            if error <= self.config.min_error {
                break;
            }
            if error < best {
                best = error;
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.patience {
                    debug!(epoch = run, "no improvement, stopping early");
                    break;
                }
            }
        }
        Ok(run)
    }

    /// Fine-tune on feedback at a tenth of the learning rate.
    pub fn adapt(&mut self, data: &TrainingData) -> bool {
        let original = self.optimizer.learning_rate();
        self.optimizer.set_learning_rate(original * ADAPT_RATE_FACTOR);
        let ok = self.train(data);
        self.optimizer.set_learning_rate(original);
        ok
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("deep network is not active"));
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

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.next_input_size()
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
        format!("DeepNeuralNetwork[{}]", describe_layers(&self.layers))
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== DeepNeuralNetwork Statistics ===\n");
        stats.push_str(&format!("Architecture: {}\n", self.architecture()));
        stats.push_str(&format!("Input Size: {}\n", self.input_size));
        stats.push_str(&format!("Output Size: {}\n", self.output_size()));
        stats.push_str(&format!("Layers: {}\n", self.layers.len()));
        stats.push_str(&format!("Parameters: {}\n", self.parameter_count()));
        stats.push_str(&format!("Active: {}\n", self.state.is_active()));
        stats.push_str(&format!("Optimizer: {}\n", self.optimizer.kind()));
        stats.push_str(&format!("Learning Rate: {:.6}\n", self.optimizer.learning_rate()));
        stats.push_str(&format!("Training Epochs: {}\n", self.state.training_epochs()));
        stats.push_str(&format!("Current Error: {:.6}\n", self.state.current_error()));
        stats.push_str(&format!("Last Training: {}\n", format_time(self.state.last_training_time())));
        let recent = self
            .state
            .recent_errors(STATISTICS_ERRORS)
            .iter()
            .map(|e| format!("{:.6}", e))
            .collect::<Vec<_>>()
            .join(", ");
        stats.push_str(&format!("Recent Errors: [{}]\n", recent));
        stats
    }
}

fn report(result: Result<usize>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "deep network training failed");
            false
        }
    }
}
