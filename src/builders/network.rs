use crate::activations::Activation;
use crate::config::LearningConfig;
use crate::error::{LearningError, Result};
use crate::network::DeepNeuralNetwork;
use crate::optimizer::{AdvancedOptimizer, OptimizerKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum LayerStep {
    Dense(usize, Activation),
    Dropout(f32),
    BatchNorm,
}

/// Builder for constructing deep networks with a fluent API
///
/// Unlike the `add_*` methods on [`DeepNeuralNetwork`], `build` reports which
/// layer was rejected.
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    input_size: usize,
    steps: Vec<LayerStep>,
    config: Option<LearningConfig>,
    optimizer: Option<(OptimizerKind, Option<f32>)>,
    activate: bool,
}

impl NetworkBuilder {
    pub fn new(input_size: usize) -> Self {
        NetworkBuilder {
            input_size,
            steps: Vec::new(),
            config: None,
            optimizer: None,
            activate: false,
        }
    }

    pub fn add_dense(mut self, neurons: usize, activation: Activation) -> Self {
        self.steps.push(LayerStep::Dense(neurons, activation));
        self
    }

    /// Add a sequence of dense layers
    pub fn add_layers(mut self, sizes: &[usize], activations: &[Activation]) -> Result<Self> {
        if sizes.len() != activations.len() {
            return Err(LearningError::dimension_mismatch(
                format!("{} activations", sizes.len()),
                format!("{} activations", activations.len()),
            ));
        }
        for (&neurons, &activation) in sizes.iter().zip(activations) {
            self.steps.push(LayerStep::Dense(neurons, activation));
        }
        Ok(self)
    }

    pub fn add_dropout(mut self, rate: f32) -> Self {
        self.steps.push(LayerStep::Dropout(rate));
        self
    }

    pub fn add_batch_norm(mut self) -> Self {
        self.steps.push(LayerStep::BatchNorm);
        self
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the optimizer chosen by the config.
    pub fn with_optimizer(mut self, kind: OptimizerKind) -> Self {
        self.optimizer = Some((kind, None));
        self
    }

    pub fn with_optimizer_rate(mut self, kind: OptimizerKind, learning_rate: f32) -> Self {
        self.optimizer = Some((kind, Some(learning_rate)));
        self
    }

    /// Activate the network after building it.
    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }

    pub fn build(self) -> Result<DeepNeuralNetwork> {
        if self.steps.is_empty() {
            return Err(LearningError::invalid_argument("network must have at least one layer"));
        }

        let mut network = DeepNeuralNetwork::new(self.input_size)?;
        if let Some(config) = self.config {
            network = network.with_config(config);
        }
        if let Some((kind, rate)) = self.optimizer {
            let rate = rate.unwrap_or_else(|| network.learning_rate());
            network.set_optimizer(AdvancedOptimizer::new(kind, rate));
        }

        for (idx, step) in self.steps.iter().enumerate() {
            let added = match *step {
                LayerStep::Dense(neurons, activation) => network.add_dense_layer(neurons, activation),
                LayerStep::Dropout(rate) => network.add_dropout_layer(rate),
                LayerStep::BatchNorm => network.add_batch_norm_layer(),
            };
            if !added {
                return Err(LearningError::invalid_argument(format!("layer {} ({:?}) was rejected", idx, step)));
            }
        }

        if self.activate && !network.activate() {
            return Err(LearningError::illegal_state("network could not be activated"));
        }
        Ok(network)
    }
}
