use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

use super::recurrent::{check_sizes, sigmoid, sigmoid_grad, tanh, tanh_grad, GateWeights};
use super::traits::{
    backward_before_forward, check_vector, LayerKind, LayerShape, NetworkLayer, Parameter, MAX_CACHED_STEPS,
};
use crate::error::Result;

/// LSTM (Long Short-Term Memory) layer for sequence processing
///
/// Each `forward` call consumes one time step. The hidden and cell states
/// persist across calls until [`reset_state`](NetworkLayer::reset_state) or
/// [`set_initial_state`](LstmLayer::set_initial_state). Successive `backward`
/// calls walk back through the cached steps, newest first.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,

    pub input_gate: GateWeights,
    /// Bias initialized to 1 so the cell remembers by default
    pub forget_gate: GateWeights,
    pub cell_gate: GateWeights,
    pub output_gate: GateWeights,

    hidden_state: Array1<f32>,
    cell_state: Array1<f32>,

    steps: VecDeque<LstmStep>,
    /// Gradients carried from a later step into the previous one
    dh_next: Array1<f32>,
    dc_next: Array1<f32>,
}

#[derive(Debug, Clone)]
struct LstmStep {
    x: Array1<f32>,
    h_prev: Array1<f32>,
    c_prev: Array1<f32>,
    i: Array1<f32>,
    f: Array1<f32>,
    g: Array1<f32>,
    o: Array1<f32>,
    tanh_c: Array1<f32>,
}

impl LstmLayer {
    /// Hidden units must be in `[1, 1024]`.
    pub fn new(input_size: usize, hidden_size: usize) -> Result<Self> {
        check_sizes(input_size, hidden_size)?;

        Ok(LstmLayer {
            input_size,
            hidden_size,
            input_gate: GateWeights::new(["input.w_x", "input.w_h", "input.b"], input_size, hidden_size, 0.0),
            forget_gate: GateWeights::new(["forget.w_x", "forget.w_h", "forget.b"], input_size, hidden_size, 1.0),
            cell_gate: GateWeights::new(["cell.w_x", "cell.w_h", "cell.b"], input_size, hidden_size, 0.0),
            output_gate: GateWeights::new(["output.w_x", "output.w_h", "output.b"], input_size, hidden_size, 0.0),
            hidden_state: Array1::zeros(hidden_size),
            cell_state: Array1::zeros(hidden_size),
            steps: VecDeque::new(),
            dh_next: Array1::zeros(hidden_size),
            dc_next: Array1::zeros(hidden_size),
        })
    }

    /// Seed the hidden and/or cell state. A missing vector or one with the
    /// wrong length is ignored.
    pub fn set_initial_state(&mut self, hidden: Option<ArrayView1<f32>>, cell: Option<ArrayView1<f32>>) {
        if let Some(h) = hidden.filter(|h| h.len() == self.hidden_size) {
            self.hidden_state.assign(&h);
        }
        if let Some(c) = cell.filter(|c| c.len() == self.hidden_size) {
            self.cell_state.assign(&c);
        }
    }

    /// Copy of the current hidden state
    pub fn hidden_state(&self) -> Array1<f32> {
        self.hidden_state.clone()
    }

    /// Copy of the current cell state
    pub fn cell_state(&self) -> Array1<f32> {
        self.cell_state.clone()
    }

    /// Number of time steps available for backpropagation
    pub fn cached_steps(&self) -> usize {
        self.steps.len()
    }

    fn gates(&self) -> [&GateWeights; 4] {
        [&self.input_gate, &self.forget_gate, &self.cell_gate, &self.output_gate]
    }
}

impl NetworkLayer for LstmLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Lstm
    }

    fn input_shape(&self) -> LayerShape {
        LayerShape::Flat(self.input_size)
    }

    fn output_shape(&self) -> LayerShape {
        LayerShape::Flat(self.hidden_size)
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_vector("LSTM input", self.input_size, input.len())?;
        let h_prev = &self.hidden_state;
        let c_prev = &self.cell_state;

        let i = sigmoid(&self.input_gate.pre_activation(input, h_prev));
        let f = sigmoid(&self.forget_gate.pre_activation(input, h_prev));
        let g = tanh(&self.cell_gate.pre_activation(input, h_prev));
        let o = sigmoid(&self.output_gate.pre_activation(input, h_prev));

        // c_t = f ∘ c_{t-1} + i ∘ g, h_t = o ∘ tanh(c_t)
        let c = &f * c_prev + &i * &g;
        let tanh_c = tanh(&c);
        let h = &o * &tanh_c;

        if self.steps.len() == MAX_CACHED_STEPS {
            self.steps.pop_front();
        }
        self.steps.push_back(LstmStep {
            x: input.to_owned(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
        });

        self.hidden_state = h.clone();
        self.cell_state = c;
        Ok(h)
    }

    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>> {
        if self.steps.is_empty() {
            return Err(backward_before_forward(LayerKind::Lstm));
        }
        check_vector("LSTM gradient", self.hidden_size, output_gradient.len())?;
        let step = match self.steps.pop_back() {
            Some(step) => step,
            None => return Err(backward_before_forward(LayerKind::Lstm)),
        };

        let dh = &output_gradient + &self.dh_next;
        let dc = &self.dc_next + &(&dh * &step.o * &tanh_grad(&step.tanh_c));

        let dz_o = &dh * &step.tanh_c * &sigmoid_grad(&step.o);
        let dz_i = &dc * &step.g * &sigmoid_grad(&step.i);
        let dz_f = &dc * &step.c_prev * &sigmoid_grad(&step.f);
        let dz_g = &dc * &step.i * &tanh_grad(&step.g);

        self.input_gate.accumulate(&dz_i, &step.x, &step.h_prev);
        self.forget_gate.accumulate(&dz_f, &step.x, &step.h_prev);
        self.cell_gate.accumulate(&dz_g, &step.x, &step.h_prev);
        self.output_gate.accumulate(&dz_o, &step.x, &step.h_prev);

        let mut dx = Array1::<f32>::zeros(self.input_size);
        let mut dh_prev = Array1::<f32>::zeros(self.hidden_size);
        for (gate, dz) in self.gates().iter().zip([&dz_i, &dz_f, &dz_g, &dz_o]) {
            let (gx, gh) = gate.backprop(dz);
            dx += &gx;
            dh_prev += &gh;
        }

        if self.steps.is_empty() {
            self.dh_next.fill(0.0);
            self.dc_next.fill(0.0);
        } else {
            self.dh_next = dh_prev;
            self.dc_next = &dc * &step.f;
        }
        Ok(dx)
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        let mut params = Vec::with_capacity(12);
        params.extend(self.input_gate.parameters());
        params.extend(self.forget_gate.parameters());
        params.extend(self.cell_gate.parameters());
        params.extend(self.output_gate.parameters());
        params
    }

    fn clear_gradients(&mut self) {
        self.input_gate.clear_gradients();
        self.forget_gate.clear_gradients();
        self.cell_gate.clear_gradients();
        self.output_gate.clear_gradients();
    }

    /// `4 · (h · (i + h) + h)`
    fn parameter_count(&self) -> usize {
        self.gates().iter().map(|g| g.parameter_count()).sum()
    }

    fn reset_state(&mut self) {
        self.hidden_state.fill(0.0);
        self.cell_state.fill(0.0);
        self.steps.clear();
        self.dh_next.fill(0.0);
        self.dc_next.fill(0.0);
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
