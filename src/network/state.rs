//! Lifecycle and training bookkeeping shared by the network composites.

use std::collections::VecDeque;
use std::time::SystemTime;

use ndarray::{Array1, ArrayView1};

use crate::error::{check_len, Result};
use crate::layers::NetworkLayer;

/// Active flag plus the training record of a network.
#[derive(Debug, Clone)]
pub struct NetworkState {
    active: bool,
    training_epochs: u64,
    current_error: f32,
    last_training_time: Option<SystemTime>,
    error_history: VecDeque<f32>,
    history_limit: usize,
}

impl NetworkState {
    pub fn new(history_limit: usize) -> Self {
        NetworkState {
            active: false,
            training_epochs: 0,
            current_error: 0.0,
            last_training_time: None,
            error_history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn training_epochs(&self) -> u64 {
        self.training_epochs
    }

    pub fn current_error(&self) -> f32 {
        self.current_error
    }

    pub fn last_training_time(&self) -> Option<SystemTime> {
        self.last_training_time
    }

    /// Errors of past epochs, oldest first
    pub fn error_history(&self) -> Vec<f32> {
        self.error_history.iter().copied().collect()
    }

    /// The most recent `n` errors, oldest first
    pub fn recent_errors(&self, n: usize) -> Vec<f32> {
        let skip = self.error_history.len().saturating_sub(n);
        self.error_history.iter().skip(skip).copied().collect()
    }

    /// Record one finished epoch.
    pub fn record_epoch(&mut self, error: f32) {
        self.error_history.push_back(error);
        while self.error_history.len() > self.history_limit {
            self.error_history.pop_front();
        }
        self.current_error = error;
        self.training_epochs += 1;
    }

    pub fn finish_training(&mut self) {
        self.last_training_time = Some(SystemTime::now());
    }

    /// Clear the training record; the active flag is left alone.
    pub fn reset_counters(&mut self) {
        self.training_epochs = 0;
        self.current_error = 0.0;
        self.last_training_time = None;
        self.error_history.clear();
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit.max(1);
        while self.error_history.len() > self.history_limit {
            self.error_history.pop_front();
        }
    }
}

/// Run `input` through every layer in order.
pub(crate) fn forward_layers(layers: &mut [Box<dyn NetworkLayer>], input: ArrayView1<f32>) -> Result<Array1<f32>> {
    let mut current = input.to_owned();
    for layer in layers.iter_mut() {
        current = layer.forward(current.view())?;
    }
    Ok(current)
}

/// Propagate an output gradient back through every layer in reverse order.
pub(crate) fn backward_layers(layers: &mut [Box<dyn NetworkLayer>], gradient: Array1<f32>) -> Result<Array1<f32>> {
    let mut current = gradient;
    for layer in layers.iter_mut().rev() {
        current = layer.backward(current.view())?;
    }
    Ok(current)
}

pub(crate) fn set_training(layers: &mut [Box<dyn NetworkLayer>], training: bool) {
    for layer in layers.iter_mut() {
        layer.set_training(training);
    }
}

/// Mean squared error between an output and its target.
pub fn mean_squared_error(output: &Array1<f32>, target: ArrayView1<f32>) -> Result<f32> {
    check_len("target", output.len(), target.len())?;
    if output.is_empty() {
        return Ok(0.0);
    }
    let diff = output - &target;
    Ok(diff.mapv(|d| d * d).sum() / output.len() as f32)
}

/// `"Dense -> Dropout -> ..."`
pub(crate) fn describe_layers(layers: &[Box<dyn NetworkLayer>]) -> String {
    layers
        .iter()
        .map(|l| l.kind().name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub(crate) fn format_time(time: Option<SystemTime>) -> String {
    match time.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok()) {
        Some(d) => format!("{} ms since epoch", d.as_millis()),
        None => "never".to_string(),
    }
}
