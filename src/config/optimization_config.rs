//! Hyperparameters of a single optimization run.
//!
//! Loaded from TOML by the CLI or built in code; validated synchronously by
//! the controller before any worker is spawned.

use crate::domain::errors::ConfigurationError;
use crate::domain::optimization::objective::{ObjectiveSet, ObjectiveSpec};
use crate::domain::optimization::parameter_space::{GeneSpec, ParameterSpace};
use crate::domain::optimization::selection::SelectionAlgorithm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_tournament_size() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub population_size: usize,
    pub number_of_iterations: u64,
    /// Share of each new generation produced by crossover, in (0, 1)
    pub propagation_fraction: f64,
    pub elite_size: usize,
    /// Per-gene mutation probability, in [0, 1]
    pub chance_of_mutation: f64,
    pub selection_algorithm: SelectionAlgorithm,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    pub objectives: Vec<ObjectiveSpec>,
    pub parameters: Vec<GeneSpec>,
    /// Fixed seed for reproducible runs; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl OptimizationConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse optimization config TOML")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read optimization config: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Checks every hyperparameter; the first violation is reported
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.population_size == 0 {
            return Err(ConfigurationError::EmptyPopulation);
        }
        if self.number_of_iterations == 0 {
            return Err(ConfigurationError::NoIterations);
        }
        if !(self.propagation_fraction > 0.0 && self.propagation_fraction < 1.0) {
            return Err(ConfigurationError::PropagationFractionOutOfRange {
                value: self.propagation_fraction,
            });
        }
        if self.elite_size == 0 || self.elite_size > self.population_size {
            return Err(ConfigurationError::EliteSizeOutOfRange {
                elite_size: self.elite_size,
                population_size: self.population_size,
            });
        }
        if !(0.0..=1.0).contains(&self.chance_of_mutation) {
            return Err(ConfigurationError::MutationChanceOutOfRange {
                value: self.chance_of_mutation,
            });
        }
        if self.tournament_size == 0 {
            return Err(ConfigurationError::InvalidTournamentSize);
        }
        self.objective_set()?;
        self.parameter_space()?;
        Ok(())
    }

    pub fn objective_set(&self) -> Result<ObjectiveSet, ConfigurationError> {
        ObjectiveSet::new(self.objectives.clone())
    }

    pub fn parameter_space(&self) -> Result<ParameterSpace, ConfigurationError> {
        ParameterSpace::new(self.parameters.clone())
    }

    /// Number of offspring bred by crossover each generation
    pub fn crossover_offspring(&self) -> usize {
        let count = (self.propagation_fraction * self.population_size as f64).round() as usize;
        count.min(self.population_size)
    }
}
