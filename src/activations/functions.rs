use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::gelu;

/// Inputs are clamped to this magnitude before exponentials are taken.
pub const SATURATION_LIMIT: f32 = 40.0;

/// Tanh is treated as fully saturated beyond this magnitude.
const TANH_LIMIT: f32 = 20.0;

pub const DEFAULT_LEAKY_ALPHA: f32 = 0.01;
pub const DEFAULT_ELU_ALPHA: f32 = 1.0;

/// An enumeration of the activation functions available to network layers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu { alpha: f32 },
    Elu { alpha: f32 },
    /// Vector-only normalization; the scalar form is the identity.
    Softmax,
    Swish,
    Gelu,
    Linear,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-SATURATION_LIMIT, SATURATION_LIMIT);
    1.0 / (1.0 + (-x).exp())
}

impl Activation {
    /// LeakyReLU with the default negative slope.
    pub fn leaky_relu() -> Self {
        Activation::LeakyRelu { alpha: DEFAULT_LEAKY_ALPHA }
    }

    /// ELU with the default alpha.
    pub fn elu() -> Self {
        Activation::Elu { alpha: DEFAULT_ELU_ALPHA }
    }

    /// Display name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Sigmoid => "Sigmoid",
            Activation::Tanh => "Tanh",
            Activation::Relu => "ReLU",
            Activation::LeakyRelu { .. } => "LeakyReLU",
            Activation::Elu { .. } => "ELU",
            Activation::Softmax => "Softmax",
            Activation::Swish => "Swish",
            Activation::Gelu => "GELU",
            Activation::Linear => "Linear",
        }
    }

    /// Value of the function at `x`.
    pub fn activate(&self, x: f32) -> f32 {
        match *self {
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => {
                if x >= TANH_LIMIT {
                    1.0
                } else if x <= -TANH_LIMIT {
                    -1.0
                } else {
                    x.tanh()
                }
            }
            Activation::Relu => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Elu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * (x.max(-SATURATION_LIMIT).exp() - 1.0)
                }
            }
            Activation::Softmax | Activation::Linear => x,
            Activation::Swish => x * sigmoid(x),
            Activation::Gelu => gelu::gelu(x),
        }
    }

    /// Derivative of the function at `x`, reusing `activate(x)` where the
    /// closed form allows it.
    pub fn derivative(&self, x: f32) -> f32 {
        match *self {
            Activation::Sigmoid => {
                let a = sigmoid(x);
                a * (1.0 - a)
            }
            Activation::Tanh => {
                let a = self.activate(x);
                1.0 - a * a
            }
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Elu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    self.activate(x) + alpha
                }
            }
            Activation::Softmax | Activation::Linear => 1.0,
            Activation::Swish => {
                let s = sigmoid(x);
                let xc = x.clamp(-SATURATION_LIMIT, SATURATION_LIMIT);
                s + xc * s * (1.0 - s)
            }
            Activation::Gelu => gelu::gelu_derivative(x),
        }
    }

    /// Apply the activation to a vector in place. Softmax normalizes the
    /// whole vector; every other function is applied element-wise.
    pub fn apply(&self, input: &mut Array1<f32>) {
        match self {
            Activation::Softmax => {
                let normalized = softmax(input.view());
                input.assign(&normalized);
            }
            Activation::Linear => {}
            _ => input.mapv_inplace(|v| self.activate(v)),
        }
    }

    /// Element-wise derivative of a pre-activation vector.
    pub fn derivative_vec(&self, input: &Array1<f32>) -> Array1<f32> {
        input.mapv(|v| self.derivative(v))
    }
}

/// Normalize a vector into a probability distribution.
///
/// The maximum is subtracted first so large entries cannot overflow. Every
/// entry of the result is strictly positive for finite input and the entries
/// sum to one.
pub fn softmax(input: ArrayView1<f32>) -> Array1<f32> {
    if input.is_empty() {
        return Array1::zeros(0);
    }
    let max = input.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    // Shifted values are capped below so exp never underflows to exactly zero.
    let exps = input.mapv(|v| (v - max).max(-80.0).exp());
    let sum = exps.sum();
    exps / sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_names() {
        assert_eq!(Activation::Relu.name(), "ReLU");
        assert_eq!(Activation::leaky_relu().name(), "LeakyReLU");
        assert_eq!(Activation::Gelu.name(), "GELU");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Activation::leaky_relu(), Activation::LeakyRelu { alpha: 0.01 });
        assert_eq!(Activation::elu(), Activation::Elu { alpha: 1.0 });
        assert_eq!(Activation::default(), Activation::Sigmoid);
    }

    #[test]
    fn test_softmax_vector_apply() {
        let mut v = array![1.0, 2.0, 3.0];
        Activation::Softmax.apply(&mut v);
        assert!((v.sum() - 1.0).abs() < 1e-6);
        assert!(v[2] > v[1] && v[1] > v[0]);
    }
}
