//! # Optimizer Module
//!
//! [`AdvancedOptimizer`] turns the gradients accumulated by a network's
//! layers into parameter updates. Moment buffers live in the optimizer, keyed
//! by layer and parameter position, so one optimizer serves one network.

pub mod rules;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layers::NetworkLayer;
pub use rules::{MomentSlot, UpdateRule};

pub const MIN_LEARNING_RATE: f32 = 1e-8;
pub const MAX_LEARNING_RATE: f32 = 1.0;
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;
pub const DEFAULT_EPSILON: f32 = 1e-8;

/// Upper bound for decay-style hyperparameters, which must stay below 1
pub const MAX_DECAY_RATE: f32 = 0.9999;
const MIN_EPSILON: f32 = 1e-12;

/// Optimizer variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptimizerKind {
    Sgd,
    Momentum,
    AdaGrad,
    RmsProp,
    #[default]
    Adam,
    Adamax,
    Nadam,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 7] = [
        OptimizerKind::Sgd,
        OptimizerKind::Momentum,
        OptimizerKind::AdaGrad,
        OptimizerKind::RmsProp,
        OptimizerKind::Adam,
        OptimizerKind::Adamax,
        OptimizerKind::Nadam,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "Stochastic Gradient Descent",
            OptimizerKind::Momentum => "Momentum",
            OptimizerKind::AdaGrad => "AdaGrad",
            OptimizerKind::RmsProp => "RMSprop",
            OptimizerKind::Adam => "Adam",
            OptimizerKind::Adamax => "Adamax",
            OptimizerKind::Nadam => "Nadam",
        }
    }

    /// Named hyperparameters and their defaults
    pub fn default_parameters(&self) -> BTreeMap<String, f32> {
        let pairs: &[(&str, f32)] = match self {
            OptimizerKind::Sgd => &[],
            OptimizerKind::Momentum => &[("momentum", 0.9)],
            OptimizerKind::AdaGrad => &[("epsilon", DEFAULT_EPSILON)],
            OptimizerKind::RmsProp => &[("decay", 0.9), ("epsilon", DEFAULT_EPSILON)],
            OptimizerKind::Adam | OptimizerKind::Adamax | OptimizerKind::Nadam => {
                &[("beta1", 0.9), ("beta2", 0.999), ("epsilon", DEFAULT_EPSILON)]
            }
        };
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Stateful gradient-descent optimizer with seven selectable update rules.
#[derive(Debug, Clone)]
pub struct AdvancedOptimizer {
    kind: OptimizerKind,
    learning_rate: f32,
    parameters: BTreeMap<String, f32>,
    iteration: u64,
    slots: HashMap<(usize, usize), MomentSlot>,
}

impl Default for AdvancedOptimizer {
    fn default() -> Self {
        Self::new(OptimizerKind::Adam, DEFAULT_LEARNING_RATE)
    }
}

impl AdvancedOptimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f32) -> Self {
        AdvancedOptimizer {
            kind,
            learning_rate: clamp_learning_rate(learning_rate, DEFAULT_LEARNING_RATE),
            parameters: kind.default_parameters(),
            iteration: 0,
            slots: HashMap::new(),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    /// Switch update rule. Parameters return to the new rule's defaults and
    /// accumulated moments are dropped.
    pub fn set_kind(&mut self, kind: OptimizerKind) {
        debug!(from = ?self.kind, to = ?kind, "optimizer type changed");
        self.kind = kind;
        self.parameters = kind.default_parameters();
        self.slots.clear();
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Clamped to `[1e-8, 1]`; non-finite values are ignored.
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = clamp_learning_rate(learning_rate, self.learning_rate);
    }

    /// Value of a named hyperparameter, 0 when unknown.
    pub fn parameter(&self, name: &str) -> f32 {
        self.parameters.get(name).copied().unwrap_or(0.0)
    }

    /// Decay rates (`beta1`, `beta2`, `decay`, `momentum`) are clamped to
    /// `[0, MAX_DECAY_RATE]` and `epsilon` to at least 1e-12.
    /// Non-finite values are ignored.
    pub fn set_parameter(&mut self, name: &str, value: f32) {
        if !value.is_finite() {
            debug!(name, "non-finite optimizer parameter ignored");
            return;
        }
        let value = match name {
            "beta1" | "beta2" | "decay" | "momentum" => value.clamp(0.0, MAX_DECAY_RATE),
            "epsilon" => value.max(MIN_EPSILON),
            _ => value,
        };
        self.parameters.insert(name.to_string(), value);
    }

    pub fn parameters(&self) -> &BTreeMap<String, f32> {
        &self.parameters
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Resolve the hyperparameters of the current rule.
    pub fn rule(&self) -> UpdateRule {
        let p = |name: &str| self.parameter(name);
        match self.kind {
            OptimizerKind::Sgd => UpdateRule::Sgd,
            OptimizerKind::Momentum => UpdateRule::Momentum { momentum: p("momentum") },
            OptimizerKind::AdaGrad => UpdateRule::AdaGrad { epsilon: p("epsilon") },
            OptimizerKind::RmsProp => UpdateRule::RmsProp {
                decay: p("decay"),
                epsilon: p("epsilon"),
            },
            OptimizerKind::Adam => UpdateRule::Adam {
                beta1: p("beta1"),
                beta2: p("beta2"),
                epsilon: p("epsilon"),
            },
            OptimizerKind::Adamax => UpdateRule::Adamax {
                beta1: p("beta1"),
                beta2: p("beta2"),
                epsilon: p("epsilon"),
            },
            OptimizerKind::Nadam => UpdateRule::Nadam {
                beta1: p("beta1"),
                beta2: p("beta2"),
                epsilon: p("epsilon"),
            },
        }
    }

    /// Apply one optimization step to every parameter of every layer and
    /// clear the layers' gradients.
    ///
    /// The iteration counter advances by exactly one per call, also for an
    /// empty slice.
    pub fn update_weights(&mut self, layers: &mut [Box<dyn NetworkLayer>]) {
        self.iteration += 1;
        let rule = self.rule();
        let lr = self.learning_rate;
        let t = self.iteration;

        for (layer_idx, layer) in layers.iter_mut().enumerate() {
            for (param_idx, mut param) in layer.parameters().into_iter().enumerate() {
                let shape = param.value.shape().to_vec();
                let slot = self
                    .slots
                    .entry((layer_idx, param_idx))
                    .or_insert_with(|| MomentSlot::zeros(&shape));
                if !slot.matches(&shape) {
                    *slot = MomentSlot::zeros(&shape);
                }
                rule.apply(&mut param.value, &param.gradient, slot, lr, t);
            }
            layer.clear_gradients();
        }
    }

    /// Drop all moments and restart the iteration count.
    pub fn reset(&mut self) {
        self.iteration = 0;
        self.slots.clear();
    }

    pub fn statistics(&self) -> String {
        let mut stats = String::from("=== AdvancedOptimizer Statistics ===\n");
        stats.push_str(&format!("Type: {}\n", self.kind.description()));
        stats.push_str(&format!("Learning Rate: {:.6}\n", self.learning_rate));
        stats.push_str(&format!("Iterations: {}\n", self.iteration));
        stats.push_str("Parameters:\n");
        for (name, value) in &self.parameters {
            stats.push_str(&format!("  {}: {}\n", name, value));
        }
        stats
    }
}

fn clamp_learning_rate(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE)
    } else {
        fallback
    }
}
