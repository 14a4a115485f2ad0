use super::traits::ConfigSection;
use crate::error::EvoDagError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Fail a node whose weighted output contains NaN or infinities.
    pub check_output_finite: bool,
    /// Share of training rows masked out of weight fitting.
    pub validation_fraction: f64,
    pub seed: Option<u64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            check_output_finite: false,
            validation_fraction: 0.0,
            seed: None,
        }
    }
}

impl ConfigSection for EvaluationConfig {
    fn validate(&self) -> Result<(), EvoDagError> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(EvoDagError::Configuration(
                "Validation fraction must be between 0 (inclusive) and 1 (exclusive)".to_string(),
            ));
        }
        Ok(())
    }
}
