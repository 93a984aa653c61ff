use ndarray::{Array1, Array3, ArrayView1};

use super::traits::{backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::error::{LearningError, Result};

/// Flatten a `(height, width, channels)` tensor into a vector, height-major.
pub fn flatten_spatial(input: &Array3<f32>) -> Array1<f32> {
    input.iter().cloned().collect()
}

/// Inverse of [`flatten_spatial`].
pub fn unflatten(input: ArrayView1<f32>, dims: (usize, usize, usize)) -> Result<Array3<f32>> {
    let (h, w, c) = dims;
    check_vector("spatial input", h * w * c, input.len())?;
    Array3::from_shape_vec(dims, input.to_vec())
        .map_err(|e| LearningError::dimension_mismatch(format!("{}x{}x{}", h, w, c), e))
}

/// Turns spatial feature maps into a flat vector for dense layers.
#[derive(Debug, Clone)]
pub struct FlattenLayer {
    input_dims: (usize, usize, usize),
    seen_forward: bool,
}

impl FlattenLayer {
    pub fn new(input_dims: (usize, usize, usize)) -> Self {
        FlattenLayer { input_dims, seen_forward: false }
    }

    pub fn forward_spatial(&mut self, input: &Array3<f32>) -> Result<Array1<f32>> {
        if input.dim() != self.input_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.input_dims),
                format!("{:?}", input.dim()),
            ));
        }
        self.seen_forward = true;
        Ok(flatten_spatial(input))
    }

    /// Reshape a flat gradient back into the input's spatial layout.
    pub fn backward_spatial(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array3<f32>> {
        if !self.seen_forward {
            return Err(backward_before_forward(LayerKind::Flatten));
        }
        unflatten(output_gradient, self.input_dims)
    }
}

impl NetworkLayer for FlattenLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Flatten
    }

    fn input_shape(&self) -> LayerShape {
        let (h, w, c) = self.input_dims;
        LayerShape::spatial(h, w, c)
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.input_shape().size())
    }

    // Data already travels flat between layers, so only the length is checked.
    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("Flatten input", self.input_shape().size(), input.len())?;
        self.seen_forward = true;
        Ok(input.to_owned())
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        if !self.seen_forward {
            return Err(backward_before_forward(LayerKind::Flatten));
        }
        check_vector("Flatten gradient", self.input_shape().size(), output_gradient.len())?;
        Ok(output_gradient.to_owned())
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        Vec::new()
    }

    fn clear_gradients(&mut self) {}

    fn parameter_count(&self) -> usize {
        0
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_roundtrip_layout() {
        let input = Array3::from_shape_fn((2, 2, 2), |(h, w, c)| (h * 4 + w * 2 + c) as f32);
        let mut layer = FlattenLayer::new((2, 2, 2));
        let flat = layer.forward_spatial(&input).unwrap();
        assert_eq!(flat.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        let back = layer.backward_spatial(flat.view()).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn test_flatten_backward_requires_forward() {
        let mut layer = FlattenLayer::new((1, 1, 3));
        let err = layer.backward(Array1::zeros(3).view()).unwrap_err();
        assert!(err.is_illegal_state());
    }
}
