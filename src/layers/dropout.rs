use ndarray::{Array1, ArrayView1};
use rand::Rng;

use super::traits::{backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::error::{LearningError, Result};

/// Dropout Layer
///
/// Randomly zeroes units with probability `dropout_rate` during training and
/// scales the survivors by `1 / (1 - rate)` so inference needs no rescaling.
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    pub dropout_rate: f32,
    pub training: bool,
    size: usize,
    cached_mask: Option<Array1<f32>>,
}

impl DropoutLayer {
    /// The rate must lie strictly between 0 and 1.
    pub fn new(size: usize, dropout_rate: f32) -> Result<Self> {
        if !(dropout_rate > 0.0 && dropout_rate < 1.0) {
            return Err(LearningError::invalid_argument(format!(
                "dropout rate must be in (0, 1), got {}",
                dropout_rate
            )));
        }
        if size == 0 {
            return Err(LearningError::invalid_argument("dropout layer size must be positive"));
        }

        Ok(DropoutLayer {
            dropout_rate,
            training: true,
            size,
            cached_mask: None,
        })
    }
}

impl NetworkLayer for DropoutLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Flat(self.size)
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.size)
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("Dropout input", self.size, input.len())?;

        let mask = if self.training {
            let mut rng = rand::thread_rng();
            let scale = 1.0 / (1.0 - self.dropout_rate);
            let rate = self.dropout_rate;
            Array1::from_shape_fn(self.size, |_| if rng.gen::<f32>() >= rate { scale } else { 0.0 })
        } else {
            Array1::ones(self.size)
        };

        let output = &input * &mask;
        self.cached_mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        let mask = self
            .cached_mask
            .as_ref()
            .ok_or_else(|| backward_before_forward(LayerKind::Dropout))?;
        check_vector("Dropout gradient", self.size, output_gradient.len())?;
        Ok(&output_gradient * mask)
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        Vec::new()
    }

    fn clear_gradients(&mut self) {}

    fn parameter_count(&self) -> usize {
        0
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}
