//! 2D convolution over `(height, width, channels)` feature maps.

use ndarray::{s, Array1, Array3, Array4, ArrayView1, ArrayView3, Axis};

use super::flatten::{flatten_spatial, unflatten};
use super::initialization::WeightInit;
use super::traits::{backward_before_forward, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::activations::Activation;
use crate::error::{check_range, LearningError, Result};

pub const MAX_FILTERS: usize = 512;
pub const MAX_KERNEL_SIZE: usize = 7;
pub const MAX_STRIDE: usize = 5;

/// Default input of a convolutional network: 32×32 RGB
pub const DEFAULT_INPUT_DIMS: (usize, usize, usize) = (32, 32, 3);

/// Output length along one axis: `floor((input + 2·padding − kernel) / stride) + 1`.
pub fn conv_output_size(input: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = input + 2 * padding;
    if stride == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// 2D Convolutional Layer
///
/// Square kernels slide over a zero-padded input. Kernels are stored as
/// `[filters, kernel, kernel, channels]`.
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    pub kernels: Array4<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    pub stride: usize,
    pub padding: usize,
    input_dims: (usize, usize, usize),
    output_dims: (usize, usize, usize),
    kernel_grads: Array4<f32>,
    bias_grads: Array1<f32>,
    /// Zero-padded copy of the last input
    cached_padded: Option<Array3<f32>>,
    cached_pre_activation: Option<Array3<f32>>,
}

impl Conv2DLayer {
    /// Create a convolution over inputs of shape `input_dims`.
    ///
    /// Filters must be in `[1, 512]`, the kernel in `[1, 7]`, the stride in
    /// `[1, 5]`, and the kernel must fit inside the padded input.
    pub fn new(
        input_dims: (usize, usize, usize),
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        check_range("filter count", filters, 1, MAX_FILTERS)?;
        check_range("kernel size", kernel_size, 1, MAX_KERNEL_SIZE)?;
        check_range("stride", stride, 1, MAX_STRIDE)?;
        let (h, w, c) = input_dims;
        if h == 0 || w == 0 || c == 0 {
            return Err(LearningError::invalid_argument(format!(
                "input dimensions must be positive, got {:?}",
                input_dims
            )));
        }

        let out_h = conv_output_size(h, kernel_size, stride, padding);
        let out_w = conv_output_size(w, kernel_size, stride, padding);
        let (out_h, out_w) = match (out_h, out_w) {
            (Some(oh), Some(ow)) => (oh, ow),
            _ => {
                return Err(LearningError::invalid_argument(format!(
                    "kernel {} does not fit input {}x{} with padding {}",
                    kernel_size, h, w, padding
                )))
            }
        };

        let fan_in = kernel_size * kernel_size * c;
        let kernels: Array4<f32> = WeightInit::HeUniform.sample(
            (filters, kernel_size, kernel_size, c),
            fan_in,
            kernel_size * kernel_size * filters,
        );

        Ok(Conv2DLayer {
            kernel_grads: Array4::zeros(kernels.dim()),
            kernels,
            biases: Array1::zeros(filters),
            activation: Activation::Linear,
            stride,
            padding,
            input_dims,
            output_dims: (out_h, out_w, filters),
            bias_grads: Array1::zeros(filters),
            cached_padded: None,
            cached_pre_activation: None,
        })
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn filters(&self) -> usize {
        self.kernels.dim().0
    }

    pub fn kernel_size(&self) -> usize {
        self.kernels.dim().1
    }

    pub fn input_dims(&self) -> (usize, usize, usize) {
        self.input_dims
    }

    pub fn output_dims(&self) -> (usize, usize, usize) {
        self.output_dims
    }

    pub fn kernel_gradients(&self) -> &Array4<f32> {
        &self.kernel_grads
    }

    fn pad_input(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let (h, w, c) = self.input_dims;
        let p = self.padding;
        if p == 0 {
            return input.to_owned();
        }
        let mut padded = Array3::zeros((h + 2 * p, w + 2 * p, c));
        padded.slice_mut(s![p..p + h, p..p + w, ..]).assign(&input);
        padded
    }

    /// Convolve one feature map. Rejects input whose shape differs from the
    /// shape the layer was built for.
    pub fn forward_spatial(&mut self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        if input.dim() != self.input_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.input_dims),
                format!("{:?}", input.dim()),
            ));
        }

        let padded = self.pad_input(input);
        let (out_h, out_w, filters) = self.output_dims;
        let k = self.kernel_size();
        let stride = self.stride;

        let mut z = Array3::<f32>::zeros(self.output_dims);
        for oy in 0..out_h {
            for ox in 0..out_w {
                let (y0, x0) = (oy * stride, ox * stride);
                let window = padded.slice(s![y0..y0 + k, x0..x0 + k, ..]);
                for f in 0..filters {
                    let kernel = self.kernels.index_axis(Axis(0), f);
                    z[[oy, ox, f]] = (&window * &kernel).sum() + self.biases[f];
                }
            }
        }

        let mut output = z.clone();
        output.mapv_inplace(|v| self.activation.activate(v));
        self.cached_padded = Some(padded);
        self.cached_pre_activation = Some(z);
        Ok(output)
    }

    /// Backpropagate a gradient shaped like the output feature map.
    pub fn backward_spatial(&mut self, output_gradient: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (padded, z) = match (&self.cached_padded, &self.cached_pre_activation) {
            (Some(p), Some(z)) => (p, z),
            _ => return Err(backward_before_forward(LayerKind::Conv2D)),
        };
        if output_gradient.dim() != self.output_dims {
            return Err(LearningError::dimension_mismatch(
                format!("{:?}", self.output_dims),
                format!("{:?}", output_gradient.dim()),
            ));
        }

        let activation = self.activation;
        let delta = &output_gradient * &z.mapv(|v| activation.derivative(v));
        let (out_h, out_w, filters) = self.output_dims;
        let k = self.kernels.dim().1;
        let stride = self.stride;

        let mut padded_grad = Array3::<f32>::zeros(padded.dim());
        for oy in 0..out_h {
            for ox in 0..out_w {
                let (y0, x0) = (oy * stride, ox * stride);
                let window = padded.slice(s![y0..y0 + k, x0..x0 + k, ..]);
                for f in 0..filters {
                    let d = delta[[oy, ox, f]];
                    if d == 0.0 {
                        continue;
                    }
                    self.kernel_grads.index_axis_mut(Axis(0), f).scaled_add(d, &window);
                    self.bias_grads[f] += d;
                    padded_grad
                        .slice_mut(s![y0..y0 + k, x0..x0 + k, ..])
                        .scaled_add(d, &self.kernels.index_axis(Axis(0), f));
                }
            }
        }

        let (h, w, _) = self.input_dims;
        let p = self.padding;
        Ok(padded_grad.slice(s![p..p + h, p..p + w, ..]).to_owned())
    }
}

impl NetworkLayer for Conv2DLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2D
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
        if self.cached_padded.is_none() {
            return Err(backward_before_forward(LayerKind::Conv2D));
        }
        let grad = unflatten(output_gradient, self.output_dims)?;
        let input_grad = self.backward_spatial(grad.view())?;
        Ok(flatten_spatial(&input_grad))
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::new("kernels", self.kernels.view_mut().into_dyn(), self.kernel_grads.view().into_dyn()),
            Parameter::new("biases", self.biases.view_mut().into_dyn(), self.bias_grads.view().into_dyn()),
        ]
    }

    fn clear_gradients(&mut self) {
        self.kernel_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.kernels.len() + self.biases.len()
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}
