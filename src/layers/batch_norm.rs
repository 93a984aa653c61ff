use ndarray::{Array1, ArrayView1};

use super::traits::{backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter};
use crate::error::{LearningError, Result};

pub const DEFAULT_MOMENTUM: f32 = 0.9;
pub const DEFAULT_EPSILON: f32 = 1e-5;

/// Normalization Layer
///
/// Each input vector is normalized by the mean and variance of its own
/// features during training, then scaled and shifted by the learnable
/// `gamma` and `beta`. Running statistics collected during training are
/// used instead in inference mode.
#[derive(Debug, Clone)]
pub struct BatchNormLayer {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
    pub momentum: f32,
    pub epsilon: f32,
    pub training: bool,
    gamma_grads: Array1<f32>,
    beta_grads: Array1<f32>,
    cache: Option<NormCache>,
}

#[derive(Debug, Clone)]
struct NormCache {
    normalized: Array1<f32>,
    inv_std: f32,
    /// Inference mode uses per-feature running statistics
    running_inv_std: Option<Array1<f32>>,
}

impl BatchNormLayer {
    pub fn new(num_features: usize) -> Result<Self> {
        Self::with_params(num_features, DEFAULT_MOMENTUM, DEFAULT_EPSILON)
    }

    pub fn with_params(num_features: usize, momentum: f32, epsilon: f32) -> Result<Self> {
        if num_features == 0 {
            return Err(LearningError::invalid_argument("normalization layer needs at least one feature"));
        }
        Ok(BatchNormLayer {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            momentum: momentum.clamp(0.0, 1.0),
            epsilon: epsilon.max(f32::MIN_POSITIVE),
            training: true,
            gamma_grads: Array1::zeros(num_features),
            beta_grads: Array1::zeros(num_features),
            cache: None,
        })
    }
}

impl NetworkLayer for BatchNormLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::BatchNormalization
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Flat(self.gamma.len())
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.gamma.len())
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("BatchNormalization input", self.gamma.len(), input.len())?;

        let cache = if self.training {
            let n = input.len() as f32;
            let mean = input.sum() / n;
            let var = input.mapv(|v| (v - mean) * (v - mean)).sum() / n;

            let m = self.momentum;
            self.running_mean.mapv_inplace(|r| m * r + (1.0 - m) * mean);
            self.running_var.mapv_inplace(|r| m * r + (1.0 - m) * var);

            let inv_std = 1.0 / (var + self.epsilon).sqrt();
            NormCache {
                normalized: input.mapv(|v| (v - mean) * inv_std),
                inv_std,
                running_inv_std: None,
            }
        } else {
            let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
            NormCache {
                normalized: (&input - &self.running_mean) * &inv_std,
                inv_std: 1.0,
                running_inv_std: Some(inv_std),
            }
        };

        let output = &cache.normalized * &self.gamma + &self.beta;
        self.cache = Some(cache);
        Ok(output)
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| backward_before_forward(LayerKind::BatchNormalization))?;
        check_vector("BatchNormalization gradient", self.gamma.len(), output_gradient.len())?;

        self.gamma_grads += &(&output_gradient * &cache.normalized);
        self.beta_grads += &output_gradient;
        let d_norm = &output_gradient * &self.gamma;

        if let Some(inv_std) = &cache.running_inv_std {
            return Ok(d_norm * inv_std);
        }

        // dx = inv_std / N · (N·dx̂ − Σdx̂ − x̂·Σ(dx̂·x̂))
        let n = d_norm.len() as f32;
        let sum_d = d_norm.sum();
        let sum_dx = (&d_norm * &cache.normalized).sum();
        let inv_std = cache.inv_std;
        let input_grad = (&d_norm * n - sum_d - &cache.normalized * sum_dx) * (inv_std / n);
        Ok(input_grad)
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::new("gamma", self.gamma.view_mut().into_dyn(), self.gamma_grads.view().into_dyn()),
            Parameter::new("beta", self.beta.view_mut().into_dyn(), self.beta_grads.view().into_dyn()),
        ]
    }

    fn clear_gradients(&mut self) {
        self.gamma_grads.fill(0.0);
        self.beta_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}
