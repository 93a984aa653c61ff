use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use super::{failed_members, EnsembleCore, EnsembleKind, EnsembleModel, DEFAULT_OUTPUT_CLASSES};
use crate::data::{validate_pairs, TrainingData};
use crate::error::{LearningError, Result};

pub const MIN_SAMPLE_RATIO: f32 = 0.1;
pub const MAX_SAMPLE_RATIO: f32 = 1.0;

/// Bootstrap aggregation: every member trains on its own sample drawn with
/// replacement, and predictions are the weighted member average.
#[derive(Debug)]
pub struct BaggingEnsemble {
    core: EnsembleCore,
    sample_ratio: f32,
    rng: StdRng,
}

impl BaggingEnsemble {
    /// `sample_ratio` is the bootstrap size as a fraction of the training
    /// set, clamped to `[0.1, 1]`.
    pub fn new(sample_ratio: f32) -> Self {
        Self::with_output_classes(sample_ratio, DEFAULT_OUTPUT_CLASSES)
    }

    pub fn with_output_classes(sample_ratio: f32, output_classes: usize) -> Self {
        BaggingEnsemble {
            core: EnsembleCore::new(EnsembleKind::Bagging, output_classes),
            sample_ratio: clamp_ratio(sample_ratio),
            rng: StdRng::from_entropy(),
        }
    }

    /// Make bootstrap sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn sample_ratio(&self) -> f32 {
        self.sample_ratio
    }

    pub fn set_sample_ratio(&mut self, sample_ratio: f32) {
        self.sample_ratio = clamp_ratio(sample_ratio);
    }

    /// Bootstrap size for a training set of `n` pairs, at least one.
    pub fn sample_count(&self, n: usize) -> usize {
        ((n as f32 * self.sample_ratio) as usize).max(1)
    }
}

impl EnsembleModel for BaggingEnsemble {
    fn core(&self) -> &EnsembleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EnsembleCore {
        &mut self.core
    }

    fn try_predict(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.core.check_ready(input)?;
        let predictions = self.core.class_predictions(input);
        let total_weight: f32 = predictions.iter().map(|(w, _)| w).sum();
        if predictions.is_empty() {
            return Err(LearningError::illegal_state("no member produced a usable prediction"));
        }

        let mut average = Array1::<f32>::zeros(self.core.output_classes());
        if total_weight > 0.0 {
            for (weight, prediction) in &predictions {
                average.scaled_add(weight / total_weight, prediction);
            }
        } else {
            let share = 1.0 / predictions.len() as f32;
            for (_, prediction) in &predictions {
                average.scaled_add(share, prediction);
            }
        }
        Ok(average)
    }

    fn try_train(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        if !self.core.is_active() {
            return Err(LearningError::not_active("bagging ensemble is not active"));
        }
        validate_pairs(inputs, targets)?;

        let data = TrainingData::new(inputs.to_vec(), targets.to_vec());
        let count = self.sample_count(data.len());
        let mut failed = Vec::new();
        for (idx, model) in self.core.models.iter_mut().enumerate() {
            let sample = data.bootstrap_sample(count, &mut self.rng);
            if !model.fit(&sample.inputs, &sample.targets, epochs) {
                failed.push(idx);
            }
        }
        failed_members(&failed)?;
        info!(members = self.core.models.len(), sample = count, epochs, "bagging ensemble trained");
        Ok(())
    }

    fn statistics(&self) -> String {
        let mut stats = self.core.statistics();
        stats.push_str(&format!("Sample Ratio: {:.2}\n", self.sample_ratio));
        stats
    }
}

fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.clamp(MIN_SAMPLE_RATIO, MAX_SAMPLE_RATIO)
    } else {
        MAX_SAMPLE_RATIO
    }
}
