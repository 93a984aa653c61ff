use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::initialization::WeightInit;
use super::traits::{backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::activations::Activation;
use crate::error::{check_range, LearningError, Result};

/// Smallest and largest neuron count accepted by a dense layer
pub const MIN_NEURONS: usize = 1;
pub const MAX_NEURONS: usize = 10_000;

/// A fully connected layer: `output = activation(W · input + b)` with `W`
/// sized `[outputs × inputs]`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    weight_grads: Array2<f32>,
    bias_grads: Array1<f32>,
    input: Option<Array1<f32>>,
    pre_activation: Option<Array1<f32>>,
    output: Option<Array1<f32>>,
}

impl DenseLayer {
    /// Create a dense layer, initializing weights for the given activation.
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Result<Self> {
        Self::with_init(input_size, output_size, activation, WeightInit::for_activation(&activation))
    }

    pub fn with_init(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
    ) -> Result<Self> {
        check_range("input size", input_size, MIN_NEURONS, MAX_NEURONS)?;
        check_range("neuron count", output_size, MIN_NEURONS, MAX_NEURONS)?;

        Ok(DenseLayer {
            weights: init.sample((output_size, input_size), input_size, output_size),
            biases: Array1::zeros(output_size),
            activation,
            weight_grads: Array2::zeros((output_size, input_size)),
            bias_grads: Array1::zeros(output_size),
            input: None,
            pre_activation: None,
            output: None,
        })
    }

    /// Replace the weight matrix, which must keep its `[outputs × inputs]` shape.
    pub fn with_weights(mut self, weights: Array2<f32>) -> Result<Self> {
        if weights.dim() != self.weights.dim() {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.weights.dim()),
                format!("{:?}", weights.dim()),
            ));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_biases(mut self, biases: Array1<f32>) -> Result<Self> {
        check_vector("bias vector", self.biases.len(), biases.len())?;
        self.biases = biases;
        Ok(self)
    }

    pub fn weight_gradients(&self) -> &Array2<f32> {
        &self.weight_grads
    }

    pub fn bias_gradients(&self) -> &Array1<f32> {
        &self.bias_grads
    }
}

impl NetworkLayer for DenseLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Flat(self.weights.ncols())
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.weights.nrows())
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("Dense input", self.weights.ncols(), input.len())?;

        let z = self.weights.dot(&input) + &self.biases;
        let mut output = z.clone();
        self.activation.apply(&mut output);

        self.input = Some(input.to_owned());
        self.pre_activation = Some(z);
        self.output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        let (input, z, output) = match (&self.input, &self.pre_activation, &self.output) {
            (Some(i), Some(z), Some(o)) => (i, z, o),
            _ => return Err(backward_before_forward(LayerKind::Dense)),
        };
        check_vector("Dense gradient", self.weights.nrows(), output_gradient.len())?;

        let delta = match self.activation {
            // Jacobian-vector product of softmax: s ∘ (g - <g, s>)
            Activation::Softmax => {
                let dot = output_gradient.dot(output);
                output * &output_gradient.mapv(|g| g - dot)
            }
            _ => &output_gradient * &self.activation.derivative_vec(z),
        };

        let outer = delta
            .view()
            .insert_axis(Axis(1))
            .dot(&input.view().insert_axis(Axis(0)));
        self.weight_grads += &outer;
        self.bias_grads += &delta;

        Ok(self.weights.t().dot(&delta))
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::new("weights", self.weights.view_mut().into_dyn(), self.weight_grads.view().into_dyn()),
            Parameter::new("biases", self.biases.view_mut().into_dyn(), self.bias_grads.view().into_dyn()),
        ]
    }

    fn clear_gradients(&mut self) {
        self.weight_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}
