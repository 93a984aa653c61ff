use std::time::SystemTime;

use ndarray::{Array1, ArrayView1};
use tracing::{debug, info, warn};

use super::state::{backward_layers, format_time, forward_layers, mean_squared_error, NetworkState};
use crate::activations::Activation;
use crate::config::LearningConfig;
use crate::data::TrainingData;
use crate::error::{check_len, LearningError, Result};
use crate::layers::{DenseLayer, NetworkLayer};

pub const MIN_LEARNING_RATE: f32 = 0.001;
pub const MAX_LEARNING_RATE: f32 = 1.0;

/// Learning rate multiplier used by [`NeuralNetwork::adapt`]
pub const ADAPT_RATE_FACTOR: f32 = 0.1;

/// A small fixed-shape network: one sigmoid hidden layer and a sigmoid
/// output layer, trained with plain gradient descent. Inputs are clamped to
/// `[0, 1]` before use.
#[derive(Debug, Clone)]
pub struct NeuralNetwork {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    layers: Vec<Box<dyn NetworkLayer>>,
    learning_rate: f32,
    config: LearningConfig,
    state: NetworkState,
}

impl Default for NeuralNetwork {
    fn default() -> Self {
        // 10-8-5 is always a valid shape
        Self::build(10, 8, 5).unwrap_or_else(|_| unreachable!())
    }
}

impl NeuralNetwork {
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> Result<Self> {
        Self::build(input_size, hidden_size, output_size)
    }

    fn build(input_size: usize, hidden_size: usize, output_size: usize) -> Result<Self> {
        let hidden = DenseLayer::new(input_size, hidden_size, Activation::Sigmoid)?;
        let output = DenseLayer::new(hidden_size, output_size, Activation::Sigmoid)?;
        let config = LearningConfig::shallow();

        Ok(NeuralNetwork {
            input_size,
            hidden_size,
            output_size,
            layers: vec![Box::new(hidden), Box::new(output)],
            learning_rate: clamp_rate(config.learning_rate, config.learning_rate),
            state: NetworkState::new(config.error_history_limit),
            config,
        })
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        let config = config.normalized();
        self.learning_rate = clamp_rate(config.learning_rate, self.learning_rate);
        self.state.set_history_limit(config.error_history_limit);
        self.config = config;
        self
    }

    pub fn activate(&mut self) -> bool {
        self.state.set_active(true);
        info!(architecture = %self.architecture(), "neural network activated");
        true
    }

    pub fn deactivate(&mut self) {
        self.state.set_active(false);
        info!("neural network deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Soft-failing forward pass: `None` when inactive or the input has the
    /// wrong size.
    pub fn forward(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        match self.try_forward(input) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(error = %e, "neural network forward failed");
                None
            }
        }
    }

    pub fn try_forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("neural network is not active"));
        }
        check_len("input", self.input_size, input.len())?;
        let clamped = input.mapv(|v| v.clamp(0.0, 1.0));
        forward_layers(&mut self.layers, clamped.view())
    }

    /// Train until the error reaches the configured minimum or the epoch
    /// limit is hit.
    pub fn train(&mut self, data: &TrainingData) -> bool {
        self.train_for(data, self.config.max_epochs)
    }

    /// Train for at most `epochs` epochs.
    pub fn train_for(&mut self, data: &TrainingData, epochs: usize) -> bool {
        match self.try_train(data, epochs) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "neural network training failed");
                false
            }
        }
    }

    /// Returns the number of epochs run.
    pub fn try_train(&mut self, data: &TrainingData, epochs: usize) -> Result<usize> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("neural network is not active"));
        }
        data.validate()?;
        for (x, y) in data.iter() {
            check_len("input", self.input_size, x.len())?;
            check_len("target", self.output_size, y.len())?;
        }

        let mut error = f32::MAX;
        let mut run = 0;
        while run < epochs && error > self.config.min_error {
            let mut total = 0.0;
            for (x, y) in data.iter() {
                let output = self.try_forward(x.view())?;
                total += mean_squared_error(&output, y.view())?;
                backward_layers(&mut self.layers, &output - y)?;
                for layer in self.layers.iter_mut() {
                    layer.update_weights(self.learning_rate);
                }
            }
            error = total / data.len() as f32;
            self.state.record_epoch(error);
            run += 1;
            if run % 100 == 0 {
                debug!(epoch = run, error, "neural network training progress");
            }
        }

        self.state.finish_training();
        info!(epochs = run, error, "neural network training completed");
        Ok(run)
    }

    /// Fine-tune on feedback at a tenth of the learning rate.
    pub fn adapt(&mut self, data: &TrainingData) -> bool {
        let original = self.learning_rate;
        self.learning_rate = (original * ADAPT_RATE_FACTOR).max(f32::MIN_POSITIVE);
        let ok = self.train(data);
        self.learning_rate = original;
        ok
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Clamped to `[0.001, 1]`.
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = clamp_rate(learning_rate, self.learning_rate);
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
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

    /// `"inputs-hidden-outputs"`
    pub fn architecture(&self) -> String {
        format!("{}-{}-{}", self.input_size, self.hidden_size, self.output_size)
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== NeuralNetwork Statistics ===\n");
        stats.push_str(&format!("Architecture: {}\n", self.architecture()));
        stats.push_str(&format!("Layers: {}\n", self.layers.len()));
        stats.push_str(&format!("Active: {}\n", self.state.is_active()));
        stats.push_str(&format!("Learning Rate: {:.6}\n", self.learning_rate));
        stats.push_str(&format!("Training Epochs: {}\n", self.state.training_epochs()));
        stats.push_str(&format!("Current Error: {:.6}\n", self.state.current_error()));
        stats.push_str(&format!("Last Training: {}\n", format_time(self.state.last_training_time())));
        stats
    }
}

fn clamp_rate(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE)
    } else {
        fallback
    }
}
