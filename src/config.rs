//! Model configuration
//!
//! All hyperparameters for a training run live in [`ModelConfig`]. The
//! struct deserializes from TOML so a run can be described in a file
//! and replayed exactly (together with the seed).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Configuration for a sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Dirichlet smoothing on the region-by-document distribution
    pub alpha: f64,

    /// Dirichlet smoothing on the word-by-region distribution
    pub beta: f64,

    /// CRP prior mass for opening a new region (spherical model)
    pub crp_alpha: f64,

    /// Concentration of the directional kernel (spherical model)
    pub kappa: f64,

    /// Annealing start temperature
    pub initial_temperature: f64,

    /// Annealing end temperature; sampling runs at this temperature
    pub target_temperature: f64,

    /// Iterations spent interpolating temperature (no samples kept)
    pub burn_in_iterations: usize,

    /// Iterations spent collecting posterior samples
    pub sampling_iterations: usize,

    /// RNG seed; 0 requests a non-reproducible entropy seed
    pub seed: u64,

    /// Initial region capacity for the spherical model
    pub initial_region_capacity: usize,

    /// Capacity growth factor; growth triggers while free slots fall
    /// below `expansion_factor / (1 + expansion_factor)` of capacity
    pub expansion_factor: f64,

    /// Turn degenerate draws (all-zero candidate mass) into a hard
    /// error at the end of the offending sweep
    pub fail_on_degenerate: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.1,
            crp_alpha: 10.0,
            kappa: 8.0,
            initial_temperature: 8.0,
            target_temperature: 1.0,
            burn_in_iterations: 100,
            sampling_iterations: 50,
            seed: 42,
            initial_region_capacity: 16,
            expansion_factor: 0.5,
            fail_on_degenerate: false,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration. Called by the model constructors.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.alpha <= 0.0 {
            return Err(ModelError::Config(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if self.beta <= 0.0 {
            return Err(ModelError::Config(format!(
                "beta must be positive, got {}",
                self.beta
            )));
        }
        if self.crp_alpha <= 0.0 {
            return Err(ModelError::Config(format!(
                "crp_alpha must be positive, got {}",
                self.crp_alpha
            )));
        }
        if self.kappa <= 0.0 {
            return Err(ModelError::Config(format!(
                "kappa must be positive, got {}",
                self.kappa
            )));
        }
        if self.initial_temperature <= 0.0 || self.target_temperature <= 0.0 {
            return Err(ModelError::Config(
                "temperatures must be positive".to_string(),
            ));
        }
        if self.initial_temperature < self.target_temperature {
            return Err(ModelError::Config(format!(
                "initial temperature {} below target {}; annealing only cools",
                self.initial_temperature, self.target_temperature
            )));
        }
        if self.initial_region_capacity == 0 {
            return Err(ModelError::Config(
                "initial_region_capacity must be at least 1".to_string(),
            ));
        }
        if self.expansion_factor <= 0.0 {
            return Err(ModelError::Config(format!(
                "expansion_factor must be positive, got {}",
                self.expansion_factor
            )));
        }
        Ok(())
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ModelError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
