//! # Ensemble Module
//!
//! Ensembles own several independently built [`Model`]s and combine their
//! predictions. All variants share [`EnsembleCore`] (members, weights,
//! active flag) and the provided methods of [`EnsembleModel`]; each variant
//! supplies its own `try_predict` and `try_train`.
//!
//! Members can only be added or removed while the ensemble is inactive, and
//! activation needs at least two members.

pub mod bagging;
pub mod stacking;
pub mod voting;

use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LearningError, Result};
use crate::network::Model;

pub use bagging::BaggingEnsemble;
pub use stacking::StackingEnsemble;
pub use voting::{VotingEnsemble, VotingType};

pub const MIN_MODELS: usize = 2;
pub const MAX_MODELS: usize = 20;
pub const MIN_OUTPUT_CLASSES: usize = 2;
pub const MAX_OUTPUT_CLASSES: usize = 1000;
pub const DEFAULT_OUTPUT_CLASSES: usize = 2;

/// Combination strategy tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnsembleKind {
    Voting,
    Stacking,
    Bagging,
    /// Reserved; no boosting ensemble exists yet.
    Boosting,
}

impl EnsembleKind {
    pub fn name(&self) -> &'static str {
        match self {
            EnsembleKind::Voting => "Voting",
            EnsembleKind::Stacking => "Stacking",
            EnsembleKind::Bagging => "Bagging",
            EnsembleKind::Boosting => "Boosting",
        }
    }
}

impl fmt::Display for EnsembleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State shared by every ensemble variant.
///
/// `weights` always has one entry per member and sums to 1 when non-empty.
#[derive(Debug)]
pub struct EnsembleCore {
    kind: EnsembleKind,
    models: Vec<Box<dyn Model>>,
    weights: Vec<f32>,
    active: bool,
    output_classes: usize,
}

impl EnsembleCore {
    pub fn new(kind: EnsembleKind, output_classes: usize) -> Self {
        EnsembleCore {
            kind,
            models: Vec::new(),
            weights: Vec::new(),
            active: false,
            output_classes: output_classes.clamp(MIN_OUTPUT_CLASSES, MAX_OUTPUT_CLASSES),
        }
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn output_classes(&self) -> usize {
        self.output_classes
    }

    /// Out-of-range values are ignored.
    pub fn set_output_classes(&mut self, output_classes: usize) {
        if (MIN_OUTPUT_CLASSES..=MAX_OUTPUT_CLASSES).contains(&output_classes) {
            self.output_classes = output_classes;
        }
    }

    pub fn models(&self) -> &[Box<dyn Model>] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Box<dyn Model>] {
        &mut self.models
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn reset_uniform_weights(&mut self) {
        let n = self.models.len();
        self.weights = if n == 0 { Vec::new() } else { vec![1.0 / n as f32; n] };
    }

    /// Fail unless active and given a non-empty input.
    pub fn check_ready(&self, input: ArrayView1<f32>) -> Result<()> {
        if !self.active {
            return Err(LearningError::not_active(format!("{} ensemble is not active", self.kind)));
        }
        if input.is_empty() {
            return Err(LearningError::invalid_argument("input must not be empty"));
        }
        Ok(())
    }

    /// Each member's prediction; `None` for members that declined the input.
    pub fn member_predictions(&mut self, input: ArrayView1<f32>) -> Vec<Option<Array1<f32>>> {
        self.models.iter_mut().map(|model| model.predict(input)).collect()
    }

    /// Member predictions with an output of exactly `output_classes` values,
    /// paired with the member weight.
    pub fn class_predictions(&mut self, input: ArrayView1<f32>) -> Vec<(f32, Array1<f32>)> {
        let classes = self.output_classes;
        let weights = self.weights.clone();
        self.member_predictions(input)
            .into_iter()
            .zip(weights)
            .filter_map(|(prediction, weight)| match prediction {
                Some(p) if p.len() == classes => Some((weight, p)),
                _ => None,
            })
            .collect()
    }

    /// Train every member on the same data. All members are attempted; the
    /// error names the members that failed.
    pub fn train_members(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        let failed: Vec<usize> = self
            .models
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, model)| (!model.fit(inputs, targets, epochs)).then_some(idx))
            .collect();
        failed_members(&failed)
    }
}

impl EnsembleCore {
    pub fn add_model(&mut self, model: Box<dyn Model>) -> Result<()> {
        if self.active {
            return Err(LearningError::illegal_state("cannot add models to an active ensemble"));
        }
        if self.models.len() >= MAX_MODELS {
            return Err(LearningError::illegal_state(format!("ensemble already has {} models", MAX_MODELS)));
        }
        self.models.push(model);
        self.reset_uniform_weights();
        info!(kind = %self.kind, models = self.models.len(), "model added to ensemble");
        Ok(())
    }

    pub fn remove_model(&mut self, index: usize) -> Result<Box<dyn Model>> {
        if self.active {
            return Err(LearningError::illegal_state("cannot remove models from an active ensemble"));
        }
        if index >= self.models.len() {
            return Err(LearningError::invalid_argument(format!(
                "model index {} out of range for {} models",
                index,
                self.models.len()
            )));
        }
        let model = self.models.remove(index);
        self.reset_uniform_weights();
        info!(kind = %self.kind, models = self.models.len(), "model removed from ensemble");
        Ok(model)
    }

    pub fn activate(&mut self) -> Result<()> {
        if self.models.len() < MIN_MODELS {
            return Err(LearningError::illegal_state(format!(
                "ensemble needs at least {} models, has {}",
                MIN_MODELS,
                self.models.len()
            )));
        }
        if self.weights.len() != self.models.len() {
            self.reset_uniform_weights();
        }
        for (idx, model) in self.models.iter_mut().enumerate() {
            if !model.is_active() && !model.activate() {
                warn!(member = idx, kind = %model.kind(), "ensemble member could not be activated");
            }
        }
        self.active = true;
        info!(kind = %self.kind, models = self.models.len(), "ensemble activated");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.models.clear();
        self.weights.clear();
        self.active = false;
        info!(kind = %self.kind, "ensemble models cleared");
    }

    pub fn set_weights(&mut self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.models.len() {
            return Err(LearningError::dimension_mismatch(
                format!("{} weights", self.models.len()),
                format!("{} weights", weights.len()),
            ));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(LearningError::invalid_argument(format!("invalid model weight {}", bad)));
        }
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return Err(LearningError::invalid_argument("model weights sum to zero"));
        }
        self.weights = weights.iter().map(|w| w / total).collect();
        Ok(())
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== EnsembleModel Statistics ===\n");
        stats.push_str(&format!("Type: {}\n", self.kind));
        stats.push_str(&format!("Models: {}\n", self.models.len()));
        stats.push_str(&format!("Active: {}\n", self.active));
        stats.push_str(&format!("Output Classes: {}\n", self.output_classes));
        if !self.weights.is_empty() {
            let weights = self.weights.iter().map(|w| format!("{:.3}", w)).collect::<Vec<_>>().join(", ");
            stats.push_str(&format!("Weights: {}\n", weights));
        }
        stats
    }
}

pub(crate) fn failed_members(failed: &[usize]) -> Result<()> {
    if failed.is_empty() {
        Ok(())
    } else {
        Err(LearningError::illegal_state(format!("members {:?} failed to train", failed)))
    }
}

/// Shared behavior of all ensembles.
pub trait EnsembleModel: Send + fmt::Debug {
    fn core(&self) -> &EnsembleCore;

    fn core_mut(&mut self) -> &mut EnsembleCore;

    /// Combined prediction, or the reason there is none.
    fn try_predict(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>>;

    fn try_train(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()>;

    /// `None` when inactive, given an empty input, or when no member
    /// produced a usable prediction.
    fn predict(&mut self, input: ArrayView1<f32>) -> Option<Array1<f32>> {
        match self.try_predict(input) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(kind = %self.kind(), error = %e, "ensemble prediction failed");
                None
            }
        }
    }

    fn train(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> bool {
        match self.try_train(inputs, targets, epochs) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = %self.kind(), error = %e, "ensemble training failed");
                false
            }
        }
    }

    fn kind(&self) -> EnsembleKind {
        self.core().kind()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn model_count(&self) -> usize {
        self.core().models.len()
    }

    fn output_classes(&self) -> usize {
        self.core().output_classes()
    }

    fn add_model(&mut self, model: Box<dyn Model>) -> bool {
        report(self.kind(), "add model", self.try_add_model(model))
    }

    fn try_add_model(&mut self, model: Box<dyn Model>) -> Result<()> {
        self.core_mut().add_model(model)
    }

    fn remove_model(&mut self, index: usize) -> bool {
        report(self.kind(), "remove model", self.try_remove_model(index))
    }

    fn try_remove_model(&mut self, index: usize) -> Result<Box<dyn Model>> {
        self.core_mut().remove_model(index)
    }

    /// Needs at least two members. Inactive members are activated too.
    fn activate(&mut self) -> bool {
        report(self.kind(), "activate", self.try_activate())
    }

    fn try_activate(&mut self) -> Result<()> {
        self.core_mut().activate()
    }

    fn deactivate(&mut self) {
        let core = self.core_mut();
        core.active = false;
        info!(kind = %core.kind, "ensemble deactivated");
    }

    /// Drop every member and deactivate.
    fn clear_models(&mut self) {
        self.core_mut().clear();
    }

    /// Set per-member weights, normalized to sum to 1.
    fn set_model_weights(&mut self, weights: &[f32]) -> bool {
        report(self.kind(), "set weights", self.try_set_model_weights(weights))
    }

    fn try_set_model_weights(&mut self, weights: &[f32]) -> Result<()> {
        self.core_mut().set_weights(weights)
    }

    fn model_weights(&self) -> Vec<f32> {
        self.core().weights.clone()
    }

    fn statistics(&self) -> String {
        self.core().statistics()
    }
}

fn report<T>(kind: EnsembleKind, action: &str, result: Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(kind = %kind, action, error = %e, "ensemble operation rejected");
            false
        }
    }
}
