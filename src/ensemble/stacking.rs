use ndarray::{concatenate, Array1, ArrayView1, Axis};
use tracing::{info, warn};

use super::{EnsembleCore, EnsembleKind, EnsembleModel, DEFAULT_OUTPUT_CLASSES};
use crate::data::validate_pairs;
use crate::error::{LearningError, Result};
use crate::network::Model;

/// Feeds the concatenated member predictions into a meta-learner.
///
/// A member that declines an input, or answers with the wrong width,
/// contributes `output_classes` zeros so the meta-learner always sees
/// `members * output_classes` values.
#[derive(Debug)]
pub struct StackingEnsemble {
    core: EnsembleCore,
    meta_learner: Box<dyn Model>,
    meta_learner_trained: bool,
}

impl StackingEnsemble {
    pub fn new(meta_learner: Box<dyn Model>) -> Self {
        Self::with_output_classes(meta_learner, DEFAULT_OUTPUT_CLASSES)
    }

    pub fn with_output_classes(meta_learner: Box<dyn Model>, output_classes: usize) -> Self {
        StackingEnsemble {
            core: EnsembleCore::new(EnsembleKind::Stacking, output_classes),
            meta_learner,
            meta_learner_trained: false,
        }
    }

    pub fn meta_learner(&self) -> &dyn Model {
        self.meta_learner.as_ref()
    }

    pub fn is_meta_learner_trained(&self) -> bool {
        self.meta_learner_trained
    }

    /// Width of the meta-learner input
    pub fn meta_input_size(&self) -> usize {
        self.core.models().len() * self.core.output_classes()
    }

    fn meta_input(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        let classes = self.core.output_classes();
        let parts: Vec<Array1<f32>> = self
            .core
            .member_predictions(input)
            .into_iter()
            .map(|prediction| match prediction {
                Some(p) if p.len() == classes => p,
                _ => Array1::zeros(classes),
            })
            .collect();
        let views: Vec<ArrayView1<f32>> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| LearningError::illegal_state(e.to_string()))
    }
}

impl EnsembleModel for StackingEnsemble {
    fn core(&self) -> &EnsembleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EnsembleCore {
        &mut self.core
    }

    /// Fails until the meta-learner has been trained.
    fn try_predict(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.core.check_ready(input)?;
        if !self.meta_learner_trained {
            return Err(LearningError::illegal_state("meta-learner has not been trained"));
        }
        let meta_input = self.meta_input(input)?;
        self.meta_learner
            .predict(meta_input.view())
            .ok_or_else(|| LearningError::illegal_state("meta-learner declined the stacked input"))
    }

    /// Train the members, then train the meta-learner on their stacked
    /// predictions against the same targets.
    fn try_train(&mut self, inputs: &[Array1<f32>], targets: &[Array1<f32>], epochs: usize) -> Result<()> {
        if !self.core.is_active() {
            return Err(LearningError::not_active("stacking ensemble is not active"));
        }
        validate_pairs(inputs, targets)?;

        if let Err(e) = self.core.train_members(inputs, targets, epochs) {
            warn!(error = %e, "some base models failed to train");
        }

        let meta_inputs = inputs
            .iter()
            .map(|x| self.meta_input(x.view()))
            .collect::<Result<Vec<_>>>()?;
        if !self.meta_learner.fit(&meta_inputs, targets, epochs) {
            return Err(LearningError::illegal_state("meta-learner training failed"));
        }
        self.meta_learner_trained = true;
        info!(samples = inputs.len(), epochs, "stacking ensemble trained");
        Ok(())
    }

    /// The meta-learner is activated along with the members.
    fn try_activate(&mut self) -> Result<()> {
        self.core.activate()?;
        if !self.meta_learner.is_active() && !self.meta_learner.activate() {
            self.core.active = false;
            return Err(LearningError::illegal_state("meta-learner could not be activated"));
        }
        Ok(())
    }

    fn clear_models(&mut self) {
        self.meta_learner_trained = false;
        self.core.clear();
    }

    fn statistics(&self) -> String {
        let mut stats = self.core.statistics();
        stats.push_str(&format!("Meta-Learner: {}\n", self.meta_learner.kind()));
        stats.push_str(&format!("Meta-Learner Trained: {}\n", self.meta_learner_trained));
        stats
    }
}
