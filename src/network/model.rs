//! A uniform predict/fit surface over the four network types, used by the
//! ensembles.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ConvolutionalNeuralNetwork, DeepNeuralNetwork, NeuralNetwork, RecurrentNeuralNetwork};
use crate::data::TrainingData;
use crate::layers::unflatten;

/// Network variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Shallow,
    Deep,
    Convolutional,
    Recurrent,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Shallow,
        ModelKind::Deep,
        ModelKind::Convolutional,
        ModelKind::Recurrent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Shallow => "NeuralNetwork",
            ModelKind::Deep => "DeepNeuralNetwork",
            ModelKind::Convolutional => "ConvolutionalNeuralNetwork",
            ModelKind::Recurrent => "RecurrentNeuralNetwork",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that maps a flat input vector to a flat output vector and can
/// be trained on vector pairs.
pub trait Model: Send + fmt::Debug {
    fn kind(&self) -> ModelKind;

    fn is_active(&self) -> bool;

    fn activate(&mut self) -> bool;

    /// `None` when the model is inactive or rejects the input.
    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>>;

    /// Train for `epochs` epochs; `false` when training could not run.
    fn fit(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool;

    fn statistics(&self) -> String;
}

impl Model for NeuralNetwork {
    fn kind(&self) -> ModelKind {
        ModelKind::Shallow
    }

    fn is_active(&self) -> bool {
        NeuralNetwork::is_active(self)
    }

    fn activate(&mut self) -> bool {
        NeuralNetwork::activate(self)
    }

    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        self.forward(input)
    }

    fn fit(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        self.train_for(&TrainingData::new(inputs.to_vec(), targets.to_vec()), epochs)
    }

    fn statistics(&self) -> String {
        NeuralNetwork::statistics(self)
    }
}

impl Model for DeepNeuralNetwork {
    fn kind(&self) -> ModelKind {
        ModelKind::Deep
    }

    fn is_active(&self) -> bool {
        DeepNeuralNetwork::is_active(self)
    }

    fn activate(&mut self) -> bool {
        DeepNeuralNetwork::activate(self)
    }

    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        self.forward(input)
    }

    fn fit(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        self.train_for(&TrainingData::new(inputs.to_vec(), targets.to_vec()), epochs)
    }

    fn statistics(&self) -> String {
        DeepNeuralNetwork::statistics(self)
    }
}

impl ConvolutionalNeuralNetwork {
    /// Read a flat vector as an input tensor: the network's own input shape
    /// when the length matches, otherwise `1 x 1 x n`.
    fn reshape_flat(&self, input: ArrayView1<f32>) -> Option<ndarray::Array3<f32>> {
        let (h, w, c) = self.input_dims();
        let dims = if input.len() == h * w * c {
            (h, w, c)
        } else {
            (1, 1, input.len())
        };
        match unflatten(input, dims) {
            Ok(tensor) => Some(tensor),
            Err(e) => {
                warn!(error = %e, "cannot reshape input for convolutional model");
                None
            }
        }
    }
}

impl Model for ConvolutionalNeuralNetwork {
    fn kind(&self) -> ModelKind {
        ModelKind::Convolutional
    }

    fn is_active(&self) -> bool {
        ConvolutionalNeuralNetwork::is_active(self)
    }

    fn activate(&mut self) -> bool {
        ConvolutionalNeuralNetwork::activate(self)
    }

    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        let tensor = self.reshape_flat(input)?;
        self.forward(tensor.view())
    }

    fn fit(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        let tensors: Option<Vec<_>> = inputs.iter().map(|x| self.reshape_flat(x.view())).collect();
        match tensors {
            Some(tensors) => self.train(&tensors, targets, epochs),
            None => false,
        }
    }

    fn statistics(&self) -> String {
        ConvolutionalNeuralNetwork::statistics(self)
    }
}

impl Model for RecurrentNeuralNetwork {
    fn kind(&self) -> ModelKind {
        ModelKind::Recurrent
    }

    fn is_active(&self) -> bool {
        RecurrentNeuralNetwork::is_active(self)
    }

    fn activate(&mut self) -> bool {
        RecurrentNeuralNetwork::activate(self)
    }

    /// The vector is a one-step sequence.
    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        self.forward(&[input.to_owned()])?.into_iter().next()
    }

    fn fit(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        let sequences: Vec<Vec<Array1<f32>>> = inputs.iter().map(|x| vec![x.clone()]).collect();
        let target_sequences: Vec<Vec<Array1<f32>>> = targets.iter().map(|y| vec![y.clone()]).collect();
        self.train(&sequences, &target_sequences, epochs)
    }

    fn statistics(&self) -> String {
        RecurrentNeuralNetwork::statistics(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::Activation;
    use ndarray::array;

    #[test]
    fn test_cnn_reads_short_vector_as_column() {
        let mut cnn = ConvolutionalNeuralNetwork::with_input_shape(1, 1, 3).unwrap();
        assert!(cnn.add_dense_layer(2, Activation::Sigmoid));
        assert!(Model::activate(&mut cnn));
        let out = cnn.predict(array![0.1, 0.2, 0.3].view()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(cnn.predict(array![0.1, 0.2].view()).is_none());
    }

    #[test]
    fn test_rnn_predict_is_single_step() {
        let mut rnn = RecurrentNeuralNetwork::new().with_input_size(2);
        assert!(rnn.add_gru_layer(3));
        assert!(rnn.add_dense_layer(1, Activation::Sigmoid));
        assert!(Model::activate(&mut rnn));
        let out = rnn.predict(array![0.5, -0.5].view()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(rnn.kind(), ModelKind::Recurrent);
    }
}
