use ndarray::Array1;
use rand::Rng;

use crate::error::{LearningError, Result};

/// Matched input/target pairs for supervised training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingData {
    pub inputs: Vec<Array1<f32>>,
    pub targets: Vec<Array1<f32>>,
}

impl TrainingData {
    pub fn new(inputs: Vec<Array1<f32>>, targets: Vec<Array1<f32>>) -> Self {
        TrainingData { inputs, targets }
    }

    /// Build from plain rows.
    pub fn from_rows(inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Self {
        TrainingData {
            inputs: inputs.iter().map(|row| Array1::from(row.clone())).collect(),
            targets: targets.iter().map(|row| Array1::from(row.clone())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Non-empty, with one target per input.
    pub fn validate(&self) -> Result<()> {
        validate_pairs(&self.inputs, &self.targets)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Array1<f32>, &Array1<f32>)> {
        self.inputs.iter().zip(self.targets.iter())
    }

    /// Draw `count` pairs with replacement.
    pub fn bootstrap_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> TrainingData {
        if self.is_empty() {
            return TrainingData::default();
        }
        let mut sample = TrainingData {
            inputs: Vec::with_capacity(count),
            targets: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let idx = rng.gen_range(0..self.len());
            sample.inputs.push(self.inputs[idx].clone());
            sample.targets.push(self.targets[idx].clone());
        }
        sample
    }
}

/// Check parallel input/target collections.
pub fn validate_pairs<A, B>(inputs: &[A], targets: &[B]) -> Result<()> {
    if inputs.is_empty() {
        return Err(LearningError::invalid_argument("training data is empty"));
    }
    if inputs.len() != targets.len() {
        return Err(LearningError::dimension_mismatch(
            format!("{} targets", inputs.len()),
            format!("{} targets", targets.len()),
        ));
    }
    Ok(())
}
