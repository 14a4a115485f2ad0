use super::{evaluation::EvaluationConfig, solver::SolverConfig, traits::ConfigSection};
use crate::error::EvoDagError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix for environment overrides, e.g. `EVODAG__SOLVER__SINGULAR_TOLERANCE`.
pub const ENV_PREFIX: &str = "EVODAG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub solver: SolverConfig,
    pub evaluation: EvaluationConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvoDagError> {
        self.solver.validate()?;
        self.evaluation.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    env_prefix: String,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read environment overrides from `<prefix>__*` instead of `EVODAG__*`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load a TOML or JSON file, layered with environment overrides
    /// (`EVODAG__SECTION__KEY` by default). Environment values win.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoDagError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EvoDagError::Configuration(format!("Failed to read config: {}", e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| EvoDagError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        log::debug!("loaded configuration from {}", path.as_ref().display());

        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoDagError> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| EvoDagError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| EvoDagError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply `f` and keep the result only if it validates.
    pub fn update<F>(&self, f: F) -> Result<(), EvoDagError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evodag.toml");

        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.solver.singular_tolerance = 1e-9;
                c.evaluation.check_output_finite = true;
                c.evaluation.seed = Some(3);
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let loaded = ConfigManager::new();
        loaded.load_from_file(&path).unwrap();
        assert_eq!(loaded.get(), manager.get());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[evaluation]\nvalidation_fraction = 0.25\n").unwrap();

        let manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();

        let config = manager.get();
        assert_eq!(config.evaluation.validation_fraction, 0.25);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layered.toml");
        std::fs::write(
            &path,
            "[solver]\nsingular_tolerance = 1e-9\n\n[evaluation]\nvalidation_fraction = 0.25\n",
        )
        .unwrap();

        // A prefix of its own keeps this test out of the other loads' way.
        std::env::set_var("EVODAGENV__SOLVER__SINGULAR_TOLERANCE", "0.001");
        std::env::set_var("EVODAGENV__EVALUATION__CHECK_OUTPUT_FINITE", "true");
        let manager = ConfigManager::new().with_env_prefix("EVODAGENV");
        let result = manager.load_from_file(&path);
        std::env::remove_var("EVODAGENV__SOLVER__SINGULAR_TOLERANCE");
        std::env::remove_var("EVODAGENV__EVALUATION__CHECK_OUTPUT_FINITE");
        result.unwrap();

        let config = manager.get();
        assert_eq!(config.solver.singular_tolerance, 0.001);
        assert!(config.evaluation.check_output_finite);
        assert_eq!(config.evaluation.validation_fraction, 0.25);
    }

    #[test]
    fn test_invalid_environment_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.toml");
        std::fs::write(&path, "[solver]\nsingular_tolerance = 1e-9\n").unwrap();

        std::env::set_var("EVODAGBAD__SOLVER__SINGULAR_TOLERANCE", "2.0");
        let manager = ConfigManager::new().with_env_prefix("EVODAGBAD");
        let result = manager.load_from_file(&path);
        std::env::remove_var("EVODAGBAD__SOLVER__SINGULAR_TOLERANCE");

        assert!(matches!(result, Err(EvoDagError::Configuration(_))));
        assert_eq!(manager.get(), AppConfig::default());
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.evaluation.validation_fraction = 1.5);

        assert!(result.is_err());
        assert_eq!(manager.get(), AppConfig::default());
    }
}
