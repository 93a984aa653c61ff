use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::RandomExt;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::activations::Activation;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// Uniform distribution in `[-limit, limit]`
    Uniform { limit: f32 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Sample a tensor of the given shape.
    pub fn sample<Sh, D>(&self, shape: Sh, fan_in: usize, fan_out: usize) -> Array<f32, D>
    where
        Sh: ShapeBuilder<Dim = D>,
        D: Dimension,
    {
        let fan_in = fan_in.max(1) as f32;
        let fan_out = fan_out.max(1) as f32;

        match *self {
            WeightInit::XavierUniform => uniform(shape, (6.0 / (fan_in + fan_out)).sqrt()),
            WeightInit::XavierNormal => normal(shape, (2.0 / (fan_in + fan_out)).sqrt()),
            WeightInit::HeUniform => uniform(shape, (6.0 / fan_in).sqrt()),
            WeightInit::HeNormal => normal(shape, (2.0 / fan_in).sqrt()),
            WeightInit::Uniform { limit } => uniform(shape, limit),
            WeightInit::Zeros => Array::zeros(shape),
        }
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu
            | Activation::LeakyRelu { .. }
            | Activation::Elu { .. }
            | Activation::Swish
            | Activation::Gelu => WeightInit::HeNormal,
            Activation::Sigmoid | Activation::Tanh | Activation::Softmax | Activation::Linear => {
                WeightInit::XavierUniform
            }
        }
    }
}

fn uniform<Sh, D>(shape: Sh, limit: f32) -> Array<f32, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
{
    if !(limit > 0.0 && limit.is_finite()) {
        return Array::zeros(shape);
    }
    Array::random(shape, Uniform::new(-limit, limit))
}

fn normal<Sh, D>(shape: Sh, std: f32) -> Array<f32, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
{
    match Normal::new(0.0, std) {
        Ok(dist) => Array::random(shape, dist),
        Err(_) => Array::zeros(shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    #[test]
    fn test_uniform_limits() {
        let w: Array2<f32> = WeightInit::Uniform { limit: 0.5 }.sample((20, 30), 30, 20);
        assert!(w.iter().all(|&v| v.abs() <= 0.5));
        assert_eq!(w.dim(), (20, 30));
    }

    #[test]
    fn test_kernel_shape_and_zeros() {
        let k: Array4<f32> = WeightInit::HeUniform.sample((4, 3, 3, 2), 18, 36);
        assert_eq!(k.dim(), (4, 3, 3, 2));
        let z: Array2<f32> = WeightInit::Zeros.sample((2, 2), 2, 2);
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_for_activation() {
        assert_eq!(WeightInit::for_activation(&Activation::Relu), WeightInit::HeNormal);
        assert_eq!(WeightInit::for_activation(&Activation::Sigmoid), WeightInit::XavierUniform);
    }
}
