//! Max pooling for downsampling spatial feature maps

use ndarray::{Array1, Array3, ArrayView1, ArrayView3};

use super::flatten::{flatten_spatial, unflatten};
use super::traits::{backward_before_forward, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::error::{check_range, LearningError, Result};

pub const MIN_POOL_SIZE: usize = 2;
pub const MAX_POOL_SIZE: usize = 8;
pub const MIN_POOL_STRIDE: usize = 1;
pub const MAX_POOL_STRIDE: usize = 4;

/// 2D Max Pooling Layer
///
/// Keeps the largest value of each square window per channel and remembers
/// where it came from for the backward pass.
#[derive(Debug, Clone)]
pub struct MaxPool2DLayer {
    pub pool_size: usize,
    pub stride: usize,
    input_dims: (usize, usize, usize),
    output_dims: (usize, usize, usize),
    /// Input position `(row, col)` of each output maximum
    cached_indices: Option<Array3<(usize, usize)>>,
}

impl MaxPool2DLayer {
    pub fn new(input_dims: (usize, usize, usize), pool_size: usize, stride: usize) -> Result<Self> {
        check_range("pool size", pool_size, MIN_POOL_SIZE, MAX_POOL_SIZE)?;
        check_range("pool stride", stride, MIN_POOL_STRIDE, MAX_POOL_STRIDE)?;
        let (h, w, c) = input_dims;
        if h < pool_size || w < pool_size || c == 0 {
            return Err(LearningError::invalid_argument(format!(
                "pool window {} does not fit input {}x{}x{}",
                pool_size, h, w, c
            )));
        }

        let output_dims = ((h - pool_size) / stride + 1, (w - pool_size) / stride + 1, c);
        Ok(MaxPool2DLayer {
            pool_size,
            stride,
            input_dims,
            output_dims,
            cached_indices: None,
        })
    }

    pub fn output_dims(&self) -> (usize, usize, usize) {
        self.output_dims
    }

    pub fn forward_spatial(&mut self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        if input.dim() != self.input_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.input_dims),
                format!("{:?}", input.dim()),
            ));
        }

        let (out_h, out_w, channels) = self.output_dims;
        let mut output = Array3::<f32>::zeros(self.output_dims);
        let mut indices = Array3::from_elem(self.output_dims, (0, 0));

        for c in 0..channels {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h_start = oh * self.stride;
                    let w_start = ow * self.stride;

                    let mut max_val = f32::NEG_INFINITY;
                    let mut max_pos = (h_start, w_start);
                    for h in h_start..h_start + self.pool_size {
                        for w in w_start..w_start + self.pool_size {
                            let val = input[[h, w, c]];
                            if val > max_val {
                                max_val = val;
                                max_pos = (h, w);
                            }
                        }
                    }

                    output[[oh, ow, c]] = max_val;
                    indices[[oh, ow, c]] = max_pos;
                }
            }
        }

        self.cached_indices = Some(indices);
        Ok(output)
    }

    /// Route each output gradient to the input position that won the max.
    pub fn backward_spatial(&mut self, output_gradient: ArrayView3<f32>) -> Result<Array3<f32>> {
        let indices = self
            .cached_indices
            .as_ref()
            .ok_or_else(|| backward_before_forward(LayerKind::MaxPooling))?;
        if output_gradient.dim() != self.output_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.output_dims),
                format!("{:?}", output_gradient.dim()),
            ));
        }

        let mut input_gradient = Array3::<f32>::zeros(self.input_dims);
        for ((oh, ow, c), &(h, w)) in indices.indexed_iter() {
            input_gradient[[h, w, c]] += output_gradient[[oh, ow, c]];
        }
        Ok(input_gradient)
    }
}

impl NetworkLayer for MaxPool2DLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPooling
    }

    fn input_shape(&self) -> LayerShape {
        let (h, w, c) = self.input_dims;
        LayerShape::spatial(h, w, c)
    }

    fn output_shape(&self) -> LayerShape {
        let (h, w, c) = self.output_dims;
        LayerShape::spatial(h, w, c)
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        let spatial = unflatten(input, self.input_dims)?;
        let output = self.forward_spatial(spatial.view())?;
        Ok(flatten_spatial(&output))
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        if self.cached_indices.is_none() {
            return Err(backward_before_forward(LayerKind::MaxPooling));
        }
        let grad = unflatten(output_gradient, self.output_dims)?;
        let input_grad = self.backward_spatial(grad.view())?;
        Ok(flatten_spatial(&input_grad))
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

    fn ramp_4x4() -> Array3<f32> {
        Array3::from_shape_vec(
            (4, 4, 1),
            vec![
                1.0, 2.0, 3.0, 4.0,
                5.0, 6.0, 7.0, 8.0,
                9.0, 10.0, 11.0, 12.0,
                13.0, 14.0, 15.0, 16.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_maxpool2d() {
        let mut layer = MaxPool2DLayer::new((4, 4, 1), 2, 2).unwrap();
        let output = layer.forward_spatial(ramp_4x4().view()).unwrap();

        assert_eq!(output.dim(), (2, 2, 1));
        assert_eq!(output[[0, 0, 0]], 6.0);
        assert_eq!(output[[0, 1, 0]], 8.0);
        assert_eq!(output[[1, 0, 0]], 14.0);
        assert_eq!(output[[1, 1, 0]], 16.0);
    }

    #[test]
    fn test_maxpool_backward_routes_to_max() {
        let mut layer = MaxPool2DLayer::new((4, 4, 1), 2, 2).unwrap();
        layer.forward_spatial(ramp_4x4().view()).unwrap();
        let grad = Array3::from_elem((2, 2, 1), 1.0);
        let input_grad = layer.backward_spatial(grad.view()).unwrap();

        assert_eq!(input_grad[[1, 1, 0]], 1.0);
        assert_eq!(input_grad[[0, 0, 0]], 0.0);
        assert_eq!(input_grad.sum(), 4.0);
    }

    #[test]
    fn test_overlapping_windows() {
        let layer = MaxPool2DLayer::new((4, 4, 1), 3, 1).unwrap();
        assert_eq!(layer.output_dims(), (2, 2, 1));
    }

    #[test]
    fn test_pool_parameter_limits() {
        assert!(MaxPool2DLayer::new((8, 8, 1), 1, 1).is_err());
        assert!(MaxPool2DLayer::new((16, 16, 1), 9, 1).is_err());
        assert!(MaxPool2DLayer::new((8, 8, 1), 2, 5).is_err());
        assert!(MaxPool2DLayer::new((2, 2, 1), 3, 1).is_err());
    }
}
