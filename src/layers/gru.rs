use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

use super::recurrent::{check_sizes, sigmoid, sigmoid_grad, tanh, tanh_grad, GateWeights};
use super::traits::{
    backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter, MAX_CACHED_STEPS,
};
use crate::error::Result;

/// GRU (Gated Recurrent Unit) layer
///
/// A lighter recurrent cell than LSTM: three gate groups instead of four and
/// no separate cell state.
///
/// ```text
/// r_t = σ(x W_ir + h W_hr + b_r)
/// z_t = σ(x W_iz + h W_hz + b_z)
/// n_t = tanh(x W_in + (r_t ∘ h) W_hn + b_n)
/// h_t = (1 - z_t) ∘ n_t + z_t ∘ h
/// ```
#[derive(Debug, Clone)]
pub struct GruLayer {
    pub input_size: usize,
    pub hidden_size: usize,

    pub reset_gate: GateWeights,
    pub update_gate: GateWeights,
    pub candidate_gate: GateWeights,

    hidden_state: Array1<f32>,
    steps: VecDeque<GruStep>,
    dh_next: Array1<f32>,
}

#[derive(Debug, Clone)]
struct GruStep {
    x: Array1<f32>,
    h_prev: Array1<f32>,
    r: Array1<f32>,
    z: Array1<f32>,
    n: Array1<f32>,
}

impl GruLayer {
    /// Hidden units must be in `[1, 1024]`.
    pub fn new(input_size: usize, hidden_size: usize) -> Result<Self> {
        check_sizes(input_size, hidden_size)?;

        Ok(GruLayer {
            input_size,
            hidden_size,
            reset_gate: GateWeights::new(["reset.w_x", "reset.w_h", "reset.b"], input_size, hidden_size, 0.0),
            update_gate: GateWeights::new(["update.w_x", "update.w_h", "update.b"], input_size, hidden_size, 0.0),
            candidate_gate: GateWeights::new(
                ["candidate.w_x", "candidate.w_h", "candidate.b"],
                input_size,
                hidden_size,
                0.0,
            ),
            hidden_state: Array1::zeros(hidden_size),
            steps: VecDeque::new(),
            dh_next: Array1::zeros(hidden_size),
        })
    }

    /// Seed the hidden state; ignored when missing or of the wrong length.
    pub fn set_initial_state(&mut self, hidden: Option<ArrayView1<f32>>) {
        if let Some(h) = hidden.filter(|h| h.len() == self.hidden_size) {
            self.hidden_state.assign(&h);
        }
    }

    /// Copy of the current hidden state
    pub fn hidden_state(&self) -> Array1<f32> {
        self.hidden_state.clone()
    }

    pub fn cached_steps(&self) -> usize {
        self.steps.len()
    }
}

impl NetworkLayer for GruLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Gru
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Flat(self.input_size)
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.hidden_size)
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("GRU input", self.input_size, input.len())?;
        let h_prev = &self.hidden_state;

        let r = sigmoid(&self.reset_gate.pre_activation(input, h_prev));
        let z = sigmoid(&self.update_gate.pre_activation(input, h_prev));
        let n = tanh(&self.candidate_gate.pre_activation(input, &(&r * h_prev)));
        let h = &z.mapv(|v| 1.0 - v) * &n + &z * h_prev;

        if self.steps.len() == MAX_CACHED_STEPS {
            self.steps.pop_front();
        }
        self.steps.push_back(GruStep {
            x: input.to_owned(),
            h_prev: h_prev.clone(),
            r,
            z,
            n,
        });

        self.hidden_state = h.clone();
        Ok(h)
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        if self.steps.is_empty() {
            return Err(backward_before_forward(LayerKind::Gru));
        }
        check_vector("GRU gradient", self.hidden_size, output_gradient.len())?;
        let step = match self.steps.pop_back() {
            Some(step) => step,
            None => return Err(backward_before_forward(LayerKind::Gru)),
        };

        let dh = &output_gradient + &self.dh_next;
        let dn = &dh * &step.z.mapv(|v| 1.0 - v);
        let dz = &dh * &(&step.h_prev - &step.n);
        let mut dh_prev = &dh * &step.z;

        // Candidate gate sees the reset-scaled hidden state
        let dz_n = &dn * &tanh_grad(&step.n);
        let reset_hidden = &step.r * &step.h_prev;
        self.candidate_gate.accumulate(&dz_n, &step.x, &reset_hidden);
        let (mut dx, d_reset_hidden) = self.candidate_gate.backprop(&dz_n);
        let dr = &d_reset_hidden * &step.h_prev;
        dh_prev += &(&d_reset_hidden * &step.r);

        let dz_r = &dr * &sigmoid_grad(&step.r);
        let dz_z = &dz * &sigmoid_grad(&step.z);
        self.reset_gate.accumulate(&dz_r, &step.x, &step.h_prev);
        self.update_gate.accumulate(&dz_z, &step.x, &step.h_prev);

        for (gate, d) in [(&self.reset_gate, &dz_r), (&self.update_gate, &dz_z)] {
            let (gx, gh) = gate.backprop(d);
            dx += &gx;
            dh_prev += &gh;
        }

        if self.steps.is_empty() {
            self.dh_next.fill(0.0);
        } else {
            self.dh_next = dh_prev;
        }
        Ok(dx)
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        let mut params = Vec::with_capacity(9);
        params.extend(self.reset_gate.parameters());
        params.extend(self.update_gate.parameters());
        params.extend(self.candidate_gate.parameters());
        params
    }

    fn clear_gradients(&mut self) {
        self.reset_gate.clear_gradients();
        self.update_gate.clear_gradients();
        self.candidate_gate.clear_gradients();
    }

    /// `3 · (h · (i + h) + h)`
    fn parameter_count(&self) -> usize {
        self.reset_gate.parameter_count()
            + self.update_gate.parameter_count()
            + self.candidate_gate.parameter_count()
    }

    fn reset_state(&mut self) {
        self.hidden_state.fill(0.0);
        self.steps.clear();
        self.dh_next.fill(0.0);
    }

    fn is_recurrent(&self) -> bool {
        true
    }

    fn backprop_horizon(&self) -> Option<usize> {
        Some(self.steps.len())
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer> {
        Box::new(self.clone())
    }
}
