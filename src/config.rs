//! Training configuration shared by the network types.
//!
//! Every network receives its configuration explicitly; there is no global
//! instance. Configurations can be loaded from JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::optimizer::OptimizerKind;

pub const MIN_NETWORK_LEARNING_RATE: f32 = 1e-4;
pub const MAX_NETWORK_LEARNING_RATE: f32 = 1.0;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1000;

/// Hyperparameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Upper bound on epochs for open-ended training
    pub max_epochs: usize,
    /// Training stops once the epoch error falls to this value
    pub min_error: f32,
    /// Epochs without improvement tolerated before stopping early
    pub patience: usize,
    pub error_history_limit: usize,
    /// Samples per optimizer step for sequence training
    pub batch_size: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self::deep()
    }
}

impl LearningConfig {
    /// Defaults of the single-hidden-layer network
    pub fn shallow() -> Self {
        LearningConfig {
            learning_rate: 0.1,
            optimizer: OptimizerKind::Sgd,
            max_epochs: 1000,
            min_error: 0.001,
            patience: 1000,
            error_history_limit: 1000,
            batch_size: 1,
        }
    }

    pub fn deep() -> Self {
        LearningConfig {
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            max_epochs: 10_000,
            min_error: 1e-4,
            patience: 100,
            error_history_limit: 1000,
            batch_size: 1,
        }
    }

    pub fn convolutional() -> Self {
        LearningConfig {
            max_epochs: 1000,
            ..Self::deep()
        }
    }

    pub fn recurrent() -> Self {
        LearningConfig {
            max_epochs: 1000,
            batch_size: 32,
            ..Self::deep()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LearningConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Clamp every bounded value into its accepted range.
    pub fn normalized(mut self) -> Self {
        self.learning_rate = if self.learning_rate.is_finite() {
            self.learning_rate.clamp(MIN_NETWORK_LEARNING_RATE, MAX_NETWORK_LEARNING_RATE)
        } else {
            Self::deep().learning_rate
        };
        self.batch_size = self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self.max_epochs = self.max_epochs.max(1);
        self.patience = self.patience.max(1);
        self.error_history_limit = self.error_history_limit.max(1);
        if !(self.min_error.is_finite() && self.min_error >= 0.0) {
            self.min_error = 0.0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LearningConfig::from_json_str(r#"{ "learning_rate": 0.05, "optimizer": "Nadam" }"#).unwrap();
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.optimizer, OptimizerKind::Nadam);
        assert_eq!(config.patience, 100);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = LearningConfig::from_json_str(r#"{ "learning_rate": 7.0, "batch_size": 0 }"#).unwrap();
        assert_eq!(config.learning_rate, 1.0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.json");
        let config = LearningConfig::recurrent();
        config.save(&path).unwrap();
        assert_eq!(LearningConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = LearningConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::LearningError::Config(_)));
    }
}
