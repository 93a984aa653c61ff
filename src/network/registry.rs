use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use super::model::{Model, ModelKind};
use super::{ConvolutionalNeuralNetwork, DeepNeuralNetwork, NeuralNetwork, RecurrentNeuralNetwork};
use crate::activations::Activation;
use crate::error::{LearningError, Result};

/// Builds a fresh, activated model.
pub type ModelConstructor = Box<dyn Fn() -> Result<Box<dyn Model>> + Send + Sync>;

/// Maps model tags to constructors.
#[derive(Default)]
pub struct ModelRegistry {
    constructors: HashMap<ModelKind, ModelConstructor>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry").field("kinds", &self.kinds()).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One default architecture per kind, mapping `input_size` values to
    /// `output_size` sigmoid outputs.
    pub fn with_defaults(input_size: usize, output_size: usize) -> Self {
        let hidden = (input_size + output_size).max(2);
        let mut registry = Self::new();

        registry.register(ModelKind::Shallow, move || {
            let mut network = NeuralNetwork::new(input_size, hidden, output_size)?;
            network.activate();
            Ok(Box::new(network) as Box<dyn Model>)
        });

        registry.register(ModelKind::Deep, move || {
            let mut network = DeepNeuralNetwork::new(input_size)?;
            let built = network.add_dense_layer(hidden, Activation::Relu)
                && network.add_dense_layer(output_size, Activation::Sigmoid)
                && network.activate();
            finish(built, ModelKind::Deep, network)
        });

        registry.register(ModelKind::Convolutional, move || {
            let mut network = ConvolutionalNeuralNetwork::with_input_shape(1, 1, input_size)?;
            let built = network.add_conv2d_layer(hidden, 1, 1, 0)
                && network.add_flatten_layer()
                && network.add_dense_layer(output_size, Activation::Sigmoid)
                && network.activate();
            finish(built, ModelKind::Convolutional, network)
        });

        registry.register(ModelKind::Recurrent, move || {
            let mut network = RecurrentNeuralNetwork::new().with_input_size(input_size);
            let built = network.add_lstm_layer(hidden)
                && network.add_dense_layer(output_size, Activation::Sigmoid)
                && network.activate();
            finish(built, ModelKind::Recurrent, network)
        });

        registry
    }

    pub fn register<F>(&mut self, kind: ModelKind, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
    }

    pub fn contains(&self, kind: ModelKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered kinds in declaration order
    pub fn kinds(&self) -> Vec<ModelKind> {
        ModelKind::ALL.into_iter().filter(|k| self.contains(*k)).collect()
    }

    pub fn create(&self, kind: ModelKind) -> Option<Box<dyn Model>> {
        match self.try_create(kind) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(kind = %kind, error = %e, "model construction failed");
                None
            }
        }
    }

    pub fn try_create(&self, kind: ModelKind) -> Result<Box<dyn Model>> {
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| LearningError::invalid_argument(format!("no constructor registered for {}", kind)))?;
        constructor()
    }
}

fn finish<M: Model + 'static>(built: bool, kind: ModelKind, model: M) -> Result<Box<dyn Model>> {
    if built {
        Ok(Box::new(model))
    } else {
        Err(LearningError::illegal_state(format!("default {} architecture could not be built", kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_defaults_build_active_models() {
        let registry = ModelRegistry::with_defaults(3, 2);
        assert_eq!(registry.kinds(), ModelKind::ALL.to_vec());
        for kind in ModelKind::ALL {
            let mut model = registry.create(kind).unwrap();
            assert!(model.is_active());
            assert_eq!(model.kind(), kind);
            let out = model.predict(array![0.1, 0.5, 0.9].view()).unwrap();
            assert_eq!(out.len(), 2);
        }
    }

    #[test]
    fn test_unregistered_kind() {
        let registry = ModelRegistry::new();
        assert!(registry.create(ModelKind::Deep).is_none());
        assert!(registry.try_create(ModelKind::Deep).unwrap_err().is_invalid_argument());
    }
}
