//! Building blocks shared by the gated recurrent layers.

use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::initialization::WeightInit;
use super::traits::Parameter;
use crate::activations::Activation;
use crate::error::{check_range, Result};

pub const MAX_HIDDEN_UNITS: usize = 1024;

/// Check recurrent layer sizes.
pub(crate) fn check_sizes(input_size: usize, hidden_units: usize) -> Result<()> {
    check_range("input size", input_size, 1, super::dense::MAX_NEURONS)?;
    check_range("hidden units", hidden_units, 1, MAX_HIDDEN_UNITS)
}

#[inline]
pub(crate) fn sigmoid(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| Activation::Sigmoid.activate(v))
}

#[inline]
pub(crate) fn tanh(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| Activation::Tanh.activate(v))
}

/// Derivative of sigmoid expressed through its output
#[inline]
pub(crate) fn sigmoid_grad(s: &Array1<f32>) -> Array1<f32> {
    s * &s.mapv(|v| 1.0 - v)
}

/// Derivative of tanh expressed through its output
#[inline]
pub(crate) fn tanh_grad(t: &Array1<f32>) -> Array1<f32> {
    t.mapv(|v| 1.0 - v * v)
}

/// Outer product `a ⊗ b`
fn outer(a: &Array1<f32>, b: &Array1<f32>) -> Array2<f32> {
    a.view().insert_axis(Axis(1)).dot(&b.view().insert_axis(Axis(0)))
}

/// Weights of one gate: `x · W_x + h · W_h + b`.
#[derive(Debug, Clone)]
pub struct GateWeights {
    /// `[input, hidden]`
    pub w_x: Array2<f32>,
    /// `[hidden, hidden]`
    pub w_h: Array2<f32>,
    pub b: Array1<f32>,
    grad_w_x: Array2<f32>,
    grad_w_h: Array2<f32>,
    grad_b: Array1<f32>,
    names: [&'static str; 3],
}

impl GateWeights {
    pub(crate) fn new(names: [&'static str; 3], input_size: usize, hidden: usize, bias: f32) -> Self {
        let init = WeightInit::Uniform {
            limit: (1.0 / (input_size + hidden) as f32).sqrt(),
        };
        GateWeights {
            w_x: init.sample((input_size, hidden), input_size, hidden),
            w_h: init.sample((hidden, hidden), hidden, hidden),
            b: Array1::from_elem(hidden, bias),
            grad_w_x: Array2::zeros((input_size, hidden)),
            grad_w_h: Array2::zeros((hidden, hidden)),
            grad_b: Array1::zeros(hidden),
            names,
        }
    }

    pub(crate) fn pre_activation(&self, x: ArrayView1<f32>, h: &Array1<f32>) -> Array1<f32> {
        x.dot(&self.w_x) + h.dot(&self.w_h) + &self.b
    }

    /// Accumulate gradients for pre-activation gradient `dz`.
    pub(crate) fn accumulate(&mut self, dz: &Array1<f32>, x: &Array1<f32>, h: &Array1<f32>) {
        self.grad_w_x += &outer(x, dz);
        self.grad_w_h += &outer(h, dz);
        self.grad_b += dz;
    }

    /// Gradients flowing to the gate's input and hidden operands.
    pub(crate) fn backprop(&self, dz: &Array1<f32>) -> (Array1<f32>, Array1<f32>) {
        (self.w_x.dot(dz), self.w_h.dot(dz))
    }

    pub(crate) fn parameters(&mut self) -> [Parameter<'_>; 3] {
        [
            Parameter::new(self.names[0], self.w_x.view_mut().into_dyn(), self.grad_w_x.view().into_dyn()),
            Parameter::new(self.names[1], self.w_h.view_mut().into_dyn(), self.grad_w_h.view().into_dyn()),
            Parameter::new(self.names[2], self.b.view_mut().into_dyn(), self.grad_b.view().into_dyn()),
        ]
    }

    pub(crate) fn clear_gradients(&mut self) {
        self.grad_w_x.fill(0.0);
        self.grad_w_h.fill(0.0);
        self.grad_b.fill(0.0);
    }

    pub fn parameter_count(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.b.len()
    }
}
