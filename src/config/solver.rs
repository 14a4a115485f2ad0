use super::traits::ConfigSection;
use crate::error::EvoDagError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// After equilibrating the Gram matrix to unit diagonal, a smallest LU
    /// pivot at most this fraction of the largest is treated as singular.
    /// `0.0` only rejects exact zeros.
    pub singular_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            singular_tolerance: 1e-12,
        }
    }
}

impl ConfigSection for SolverConfig {
    fn validate(&self) -> Result<(), EvoDagError> {
        if !self.singular_tolerance.is_finite()
            || self.singular_tolerance < 0.0
            || self.singular_tolerance >= 1.0
        {
            return Err(EvoDagError::Configuration(
                "Singular tolerance must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}
