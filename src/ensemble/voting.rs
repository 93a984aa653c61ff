use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::{EnsembleCore, EnsembleKind, EnsembleModel, DEFAULT_OUTPUT_CLASSES};
use crate::data::validate_pairs;
use crate::error::{LearningError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VotingType {
    /// Weighted count of each member's arg-max class
    Hard,
    /// Weighted average of member outputs
    #[default]
    Soft,
}

impl VotingType {
    pub fn name(&self) -> &'static str {
        match self {
            VotingType::Hard => "Hard Voting",
            VotingType::Soft => "Soft Voting",
        }
    }
}

impl fmt::Display for VotingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Combines member outputs by hard or soft voting. The result is a
/// distribution over `output_classes` classes that sums to 1.
#[derive(Debug)]
pub struct VotingEnsemble {
    core: EnsembleCore,
    voting_type: VotingType,
}

impl VotingEnsemble {
    pub fn new(voting_type: VotingType) -> Self {
        Self::with_output_classes(voting_type, DEFAULT_OUTPUT_CLASSES)
    }

    /// `output_classes` is clamped to `[2, 1000]`.
    pub fn with_output_classes(voting_type: VotingType, output_classes: usize) -> Self {
        VotingEnsemble {
            core: EnsembleCore::new(EnsembleKind::Voting, output_classes),
            voting_type,
        }
    }

    pub fn voting_type(&self) -> VotingType {
        self.voting_type
    }

    pub fn set_output_classes(&mut self, output_classes: usize) {
        self.core.set_output_classes(output_classes);
    }
}

impl EnsembleModel for VotingEnsemble {
    fn core(&self) -> &EnsembleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EnsembleCore {
        &mut self.core
    }

    fn try_predict(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.core.check_ready(input)?;
        let classes = self.core.output_classes();
        let predictions = self.core.class_predictions(input);
        if predictions.is_empty() {
            return Err(LearningError::illegal_state("no member produced a usable prediction"));
        }
        Ok(match self.voting_type {
            VotingType::Hard => hard_vote(&predictions, classes),
            VotingType::Soft => soft_vote(&predictions, classes),
        })
    }

    fn try_train(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        if !self.core.is_active() {
            return Err(LearningError::not_active("voting ensemble is not active"));
        }
        validate_pairs(inputs, targets)?;
        self.core.train_members(inputs, targets, epochs)
    }

    fn statistics(&self) -> String {
        let mut stats = self.core.statistics();
        stats.push_str(&format!("Voting Type: {}\n", self.voting_type));
        stats
    }
}

/// Index of the largest value; the first one wins ties.
pub fn arg_max(values: ArrayView1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, max)) if value <= max => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

fn hard_vote(predictions: &[(f32, Array1<f32>)], classes: usize) -> Array1<f32> {
    let mut votes = Array1::<f32>::zeros(classes);
    for (weight, prediction) in predictions {
        if let Some(class) = arg_max(prediction.view()) {
            votes[class] += weight;
        }
    }
    normalize_or_uniform(votes)
}

fn soft_vote(predictions: &[(f32, Array1<f32>)], classes: usize) -> Array1<f32> {
    let mut combined = Array1::<f32>::zeros(classes);
    for (weight, prediction) in predictions {
        combined.scaled_add(*weight, prediction);
    }
    normalize_or_uniform(combined)
}

/// Scale to sum 1; a non-positive total gives the uniform distribution.
fn normalize_or_uniform(mut values: Array1<f32>) -> Array1<f32> {
    let total = values.sum();
    if total > 0.0 && total.is_finite() {
        values /= total;
        values
    } else {
        Array1::from_elem(values.len(), 1.0 / values.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_arg_max_first_wins() {
        assert_eq!(arg_max(array![0.1, 0.7, 0.7].view()), Some(1));
        assert_eq!(arg_max(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_hard_vote_weights_classes() {
        let predictions = vec![
            (0.5, array![0.9, 0.1]),
            (0.25, array![0.2, 0.8]),
            (0.25, array![0.3, 0.7]),
        ];
        let result = hard_vote(&predictions, 2);
        assert!((result[0] - 0.5).abs() < 1e-6);
        assert!((result[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_soft_vote_sums_to_one() {
        let predictions = vec![(0.5, array![0.2, 0.6, 0.2]), (0.5, array![0.4, 0.4, 0.4])];
        let result = soft_vote(&predictions, 3);
        assert!((result.sum() - 1.0).abs() < 1e-6);
        assert!(result[1] > result[0]);
    }

    #[test]
    fn test_all_zero_outputs_give_uniform() {
        let predictions = vec![(1.0, array![0.0, 0.0, 0.0, 0.0])];
        assert_eq!(soft_vote(&predictions, 4), array![0.25, 0.25, 0.25, 0.25]);
    }
}
