use std::time::SystemTime;

use ndarray::Array1;
use tracing::{debug, info, warn};

use super::state::{describe_layers, format_time, mean_squared_error, NetworkState};
use crate::activations::Activation;
use crate::config::{LearningConfig, MAX_BATCH_SIZE, MAX_NETWORK_LEARNING_RATE, MIN_BATCH_SIZE, MIN_NETWORK_LEARNING_RATE};
use crate::data::validate_pairs;
use crate::error::{check_len, check_range, LearningError, Result};
use crate::layers::dense::{MAX_NEURONS, MIN_NEURONS};
use crate::layers::recurrent::MAX_HIDDEN_UNITS;
use crate::layers::{DenseLayer, GruLayer, LayerKind, LstmLayer, NetworkLayer};
use crate::optimizer::AdvancedOptimizer;

pub const MAX_LAYERS: usize = 20;

/// Layer recipe; layers are built once the input width is known.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LayerRecipe {
    Lstm(usize),
    Gru(usize),
    Dense(usize, Activation),
}

impl LayerRecipe {
    fn kind(&self) -> LayerKind {
        match self {
            LayerRecipe::Lstm(_) => LayerKind::Lstm,
            LayerRecipe::Gru(_) => LayerKind::Gru,
            LayerRecipe::Dense(..) => LayerKind::Dense,
        }
    }

    fn width(&self) -> usize {
        match *self {
            LayerRecipe::Lstm(units) | LayerRecipe::Gru(units) => units,
            LayerRecipe::Dense(neurons, _) => neurons,
        }
    }

    fn build(&self, input_size: usize) -> Result<Box<dyn NetworkLayer>> {
        Ok(match *self {
            LayerRecipe::Lstm(units) => Box::new(LstmLayer::new(input_size, units)?),
            LayerRecipe::Gru(units) => Box::new(GruLayer::new(input_size, units)?),
            LayerRecipe::Dense(neurons, activation) => Box::new(DenseLayer::new(input_size, neurons, activation)?),
        })
    }
}

/// Sequence model of stacked LSTM, GRU and dense layers, trained with
/// backpropagation through time.
///
/// Hidden state carries over between `forward` calls until
/// [`reset_states`](Self::reset_states) is called.
#[derive(Debug, Clone)]
pub struct RecurrentNeuralNetwork {
    input_size: Option<usize>,
    recipes: Vec<LayerRecipe>,
    layers: Vec<Box<dyn NetworkLayer>>,
    optimizer: AdvancedOptimizer,
    batch_size: usize,
    config: LearningConfig,
    state: NetworkState,
}

impl Default for RecurrentNeuralNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl RecurrentNeuralNetwork {
    /// The input width is taken from the first sequence seen.
    pub fn new() -> Self {
        let config = LearningConfig::recurrent();
        RecurrentNeuralNetwork {
            input_size: None,
            recipes: Vec::new(),
            layers: Vec::new(),
            optimizer: AdvancedOptimizer::new(config.optimizer, config.learning_rate),
            batch_size: config.batch_size,
            state: NetworkState::new(config.error_history_limit),
            config,
        }
    }

    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = Some(input_size);
        self.layers.clear();
        self
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        let config = config.normalized();
        self.optimizer = AdvancedOptimizer::new(config.optimizer, config.learning_rate);
        self.batch_size = config.batch_size;
        self.state.set_history_limit(config.error_history_limit);
        self.config = config;
        self
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn input_size(&self) -> Option<usize> {
        self.input_size
    }

    pub fn add_lstm_layer(&mut self, units: usize) -> bool {
        let result = check_range("LSTM units", units, 1, MAX_HIDDEN_UNITS)
            .and_then(|_| self.push_recipe(LayerRecipe::Lstm(units)));
        report_add(result)
    }

    pub fn add_gru_layer(&mut self, units: usize) -> bool {
        let result = check_range("GRU units", units, 1, MAX_HIDDEN_UNITS)
            .and_then(|_| self.push_recipe(LayerRecipe::Gru(units)));
        report_add(result)
    }

    pub fn add_dense_layer(&mut self, neurons: usize, activation: Activation) -> bool {
        let result = check_range("neuron count", neurons, MIN_NEURONS, MAX_NEURONS)
            .and_then(|_| self.push_recipe(LayerRecipe::Dense(neurons, activation)));
        report_add(result)
    }

    fn push_recipe(&mut self, recipe: LayerRecipe) -> Result<()> {
        if self.state.is_active() {
            return Err(LearningError::illegal_state("cannot add layers to an active network"));
        }
        if self.recipes.len() >= MAX_LAYERS {
            return Err(LearningError::illegal_state(format!("network already has {} layers", MAX_LAYERS)));
        }
        debug!(kind = %recipe.kind(), width = recipe.width(), "layer added");
        self.recipes.push(recipe);
        self.layers.clear();
        Ok(())
    }

    /// Drop every layer and deactivate.
    pub fn clear_layers(&mut self) {
        self.recipes.clear();
        self.layers.clear();
        self.optimizer.reset();
        self.state.set_active(false);
    }

    /// Fails without layers. Layers are built now when the input width is
    /// already known, otherwise on the first sequence.
    pub fn activate(&mut self) -> bool {
        if self.recipes.is_empty() {
            warn!("cannot activate a network without layers");
            return false;
        }
        if let Some(input_size) = self.input_size {
            if let Err(e) = self.build_layers(input_size) {
                warn!(error = %e, "recurrent network activation failed");
                return false;
            }
        }
        self.state.set_active(true);
        info!(architecture = %self.architecture(), "recurrent network activated");
        true
    }

    pub fn deactivate(&mut self) {
        self.state.set_active(false);
        info!("recurrent network deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn build_layers(&mut self, input_size: usize) -> Result<()> {
        if !self.layers.is_empty() && self.input_size == Some(input_size) {
            return Ok(());
        }
        let mut layers = Vec::with_capacity(self.recipes.len());
        let mut width = input_size;
        for recipe in &self.recipes {
            let layer = recipe.build(width)?;
            width = layer.output_size();
            layers.push(layer);
        }
        self.layers = layers;
        self.input_size = Some(input_size);
        self.optimizer.reset();
        Ok(())
    }

    /// Make sure layers exist for sequences whose steps have `width` values.
    fn ensure_ready(&mut self, width: usize) -> Result<()> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("recurrent network is not active"));
        }
        match self.input_size {
            Some(expected) if !self.layers.is_empty() => check_len("sequence step", expected, width),
            Some(expected) => {
                check_len("sequence step", expected, width)?;
                self.build_layers(expected)
            }
            None => self.build_layers(width),
        }
    }

    /// Process a sequence step by step, returning one output per step. An
    /// empty sequence yields an empty output.
    pub fn forward(&mut self, sequence: &[Array1<f32>]) -> Option<Vec<Array1<f32>>> {
        match self.try_forward(sequence) {
            Ok(outputs) => Some(outputs),
            Err(e) => {
                warn!(error = %e, "recurrent forward failed");
                None
            }
        }
    }

    pub fn try_forward(&mut self, sequence: &[Array1<f32>]) -> Result<Vec<Array1<f32>>> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("recurrent network is not active"));
        }
        let Some(first) = sequence.first() else {
            return Ok(Vec::new());
        };
        self.ensure_ready(first.len())?;
        let (outputs, _) = self.run_sequence(sequence)?;
        Ok(outputs)
    }

    /// Forward a whole sequence. Also returns the input each layer saw at
    /// each step, indexed `[layer][step]`.
    fn run_sequence(&mut self, sequence: &[Array1<f32>]) -> Result<(Vec<Array1<f32>>, Vec<Vec<Array1<f32>>>)> {
        let mut layer_inputs = vec![Vec::with_capacity(sequence.len()); self.layers.len()];
        let mut outputs = Vec::with_capacity(sequence.len());
        for step in sequence {
            let mut current = step.clone();
            for (idx, layer) in self.layers.iter_mut().enumerate() {
                let next = layer.forward(current.view())?;
                layer_inputs[idx].push(current);
                current = next;
            }
            outputs.push(current);
        }
        Ok((outputs, layer_inputs))
    }

    /// Backpropagate per-step output gradients through every layer.
    ///
    /// Recurrent layers unwind their own step caches in reverse order. BPTT
    /// is truncated to the steps a layer still holds; earlier steps pass a
    /// zero gradient down. Stateless layers only cache the latest step, so
    /// each step is replayed forward before its backward call.
    fn backward_sequence(&mut self, mut gradients: Vec<Array1<f32>>, layer_inputs: &[Vec<Array1<f32>>]) -> Result<()> {
        let len = gradients.len();
        for (idx, layer) in self.layers.iter_mut().enumerate().rev() {
            let first = layer.backprop_horizon().map_or(0, |held| len.saturating_sub(held));
            let mut below = vec![Array1::zeros(layer.input_size()); len];
            for step in (first..len).rev() {
                if !layer.is_recurrent() {
                    layer.forward(layer_inputs[idx][step].view())?;
                }
                below[step] = layer.backward(gradients[step].view())?;
            }
            gradients = below;
        }
        Ok(())
    }

    pub fn train(&mut self, inputs: &[Vec<Array1<f32>>], targets: &[Vec<Array1<f32>>], epochs: usize) -> bool {
        match self.try_train(inputs, targets, epochs) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "recurrent training failed");
                false
            }
        }
    }

    /// Train on input/target sequence pairs. States are reset before every
    /// sequence, and the optimizer steps once per `batch_size` sequences.
    pub fn try_train(&mut self, inputs: &[Vec<Array1<f32>>], targets: &[Vec<Array1<f32>>], epochs: usize) -> Result<()> {
        if !self.state.is_active() {
            return Err(LearningError::not_active("recurrent network is not active"));
        }
        validate_pairs(inputs, targets)?;
        for (x, y) in inputs.iter().zip(targets) {
            check_len("target sequence", x.len(), y.len())?;
        }
        let width = inputs
            .iter()
            .find_map(|seq| seq.first())
            .map(|step| step.len())
            .ok_or_else(|| LearningError::invalid_argument("all training sequences are empty"))?;
        self.ensure_ready(width)?;

        let output_size = self.output_size().unwrap_or(0);
        for (x, y) in inputs.iter().zip(targets) {
            for (step_in, step_out) in x.iter().zip(y) {
                check_len("sequence step", width, step_in.len())?;
                check_len("target step", output_size, step_out.len())?;
            }
        }

        for epoch in 0..epochs {
            let mut total = 0.0;
            let mut steps = 0usize;
            let mut pending = 0;
            for (x, y) in inputs.iter().zip(targets) {
                if x.is_empty() {
                    continue;
                }
                self.reset_states();
                let (outputs, layer_inputs) = self.run_sequence(x)?;
                let mut gradients = Vec::with_capacity(outputs.len());
                for (output, target) in outputs.iter().zip(y) {
                    total += mean_squared_error(output, target.view())?;
                    gradients.push(output - target);
                }
                steps += outputs.len();
                self.backward_sequence(gradients, &layer_inputs)?;

                pending += 1;
                if pending >= self.batch_size {
                    self.optimizer.update_weights(&mut self.layers);
                    pending = 0;
                }
            }
            if pending > 0 {
                self.optimizer.update_weights(&mut self.layers);
            }

            let error = if steps > 0 { total / steps as f32 } else { 0.0 };
            self.state.record_epoch(error);
            if (epoch + 1) % 10 == 0 {
                debug!(epoch = epoch + 1, error, "recurrent training progress");
            }
        }

        self.reset_states();
        self.state.finish_training();
        info!(epochs, error = self.state.current_error(), "recurrent training completed");
        Ok(())
    }

    /// Zero every hidden state and drop cached steps.
    pub fn reset_states(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.reset_state();
        }
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

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Clamped to `[1, 1000]`.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    }

    /// Width of each output step, known once a layer exists.
    pub fn output_size(&self) -> Option<usize> {
        self.recipes.last().map(|s| s.width())
    }

    pub fn layers(&self) -> &[Box<dyn NetworkLayer>] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.recipes.len()
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
        let names = if self.layers.is_empty() {
            self.recipes.iter().map(|s| s.kind().name()).collect::<Vec<_>>().join(" -> ")
        } else {
            describe_layers(&self.layers)
        };
        format!("RecurrentNeuralNetwork[{}]", names)
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== RecurrentNeuralNetwork Statistics ===\n");
        stats.push_str(&format!("Architecture: {}\n", self.architecture()));
        match self.input_size {
            Some(n) => stats.push_str(&format!("Input Size: {}\n", n)),
            None => stats.push_str("Input Size: unset\n"),
        }
        stats.push_str(&format!("Layers: {}\n", self.recipes.len()));
        stats.push_str(&format!("Parameters: {}\n", self.parameter_count()));
        stats.push_str(&format!("Active: {}\n", self.state.is_active()));
        stats.push_str(&format!("Optimizer: {}\n", self.optimizer.kind()));
        stats.push_str(&format!("Learning Rate: {:.6}\n", self.optimizer.learning_rate()));
        stats.push_str(&format!("Batch Size: {}\n", self.batch_size));
        stats.push_str(&format!("Training Epochs: {}\n", self.state.training_epochs()));
        stats.push_str(&format!("Current Error: {:.6}\n", self.state.current_error()));
        stats.push_str(&format!("Last Training: {}\n", format_time(self.state.last_training_time())));
        stats
    }
}

fn report_add(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "layer rejected");
            false
        }
    }
}
