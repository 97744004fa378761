/// Data Contracts
///
/// Plain request/response types exchanged with the calling layer. The engine
/// is transport-agnostic: callers hand over already-cleaned identifiers,
/// feature tuples and weighted interaction triples.
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Training request: everything one `fit` call needs.
///
/// Feature tokens are opaque categorical values (an age bracket, a
/// time-of-day tag, a cost bracket). Interaction weights are real numbers;
/// only triples with weight > 0 become positive training signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingData {
    pub users: Vec<String>,
    pub items: Vec<String>,
    pub user_features: Vec<(String, Vec<String>)>,
    pub item_features: Vec<(String, Vec<String>)>,
    pub interactions: Vec<(String, String, f32)>,
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    pub epochs: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub batch_size: usize,
    /// Negatives drawn per positive example.
    pub negative_sampling_ratio: f32,
    pub early_stopping: bool,
    /// Consecutive non-improving epochs tolerated before aborting.
    pub patience: usize,
    /// Fixed RNG seed for reproducible runs (sampling and shuffling).
    pub seed: Option<u64>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 0.01,
            weight_decay: 1e-6,
            batch_size: 256,
            negative_sampling_ratio: 1.0,
            early_stopping: true,
            patience: 3,
            seed: None,
        }
    }
}

impl TrainingParams {
    /// Reject nonsensical hyperparameters before entering the training loop.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(EngineError::InvalidInput("epochs must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(EngineError::InvalidInput("batch_size must be > 0".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if !self.negative_sampling_ratio.is_finite() || self.negative_sampling_ratio < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "negative_sampling_ratio must be non-negative, got {}",
                self.negative_sampling_ratio
            )));
        }
        if self.patience == 0 {
            return Err(EngineError::InvalidInput("patience must be > 0".into()));
        }
        Ok(())
    }
}

/// One ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: String,
    pub score: f32,
}

/// Summary of one training invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub positives: usize,
    pub negatives: usize,
    pub best_loss: f32,
    pub final_loss: f32,
    /// Mean loss per completed epoch, in order.
    pub epoch_losses: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(TrainingParams::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let params = TrainingParams {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_negative_learning_rate_rejected() {
        let params = TrainingParams {
            learning_rate: -0.1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_negative_sampling_ratio_rejected() {
        let params = TrainingParams {
            negative_sampling_ratio: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
