use thiserror::Error;

/// Rejected hyperparameters or search-space definitions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("population_size must be greater than 0")]
    EmptyPopulation,

    #[error("number_of_iterations must be greater than 0")]
    NoIterations,

    #[error("propagation_fraction must be in (0, 1), got {value}")]
    PropagationFractionOutOfRange { value: f64 },

    #[error("elite_size {elite_size} must be in [1, population_size={population_size}]")]
    EliteSizeOutOfRange {
        elite_size: usize,
        population_size: usize,
    },

    #[error("chance_of_mutation must be in [0, 1], got {value}")]
    MutationChanceOutOfRange { value: f64 },

    #[error("tournament_size must be at least 1")]
    InvalidTournamentSize,

    #[error("At least one objective is required")]
    NoObjectives,

    #[error("Objective '{name}' is declared more than once")]
    DuplicateObjective { name: String },

    #[error("Objective '{name}' has invalid weight {weight}")]
    InvalidObjectiveWeight { name: String, weight: f64 },

    #[error("Parameter space must contain at least one gene")]
    EmptyParameterSpace,

    #[error("Gene '{name}' is declared more than once")]
    DuplicateGene { name: String },

    #[error("Gene '{name}' has an invalid domain: {reason}")]
    InvalidGeneDomain { name: String, reason: String },

    #[error("Invalid runtime setting {setting}: {reason}")]
    InvalidRuntimeSetting {
        setting: &'static str,
        reason: String,
    },
}

/// Errors surfaced synchronously by the controller's command surface
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Dataset {dataset_id} contains no usable data")]
    EmptyDataset { dataset_id: String },

    #[error("Optimization run has already been started")]
    AlreadyStarted,

    #[error("Command '{command}' is not allowed while the run is {state}")]
    InvalidTransition {
        command: &'static str,
        state: String,
    },
}

/// A single individual's fitness could not be computed meaningfully.
///
/// Absorbed by the evolver: the individual receives the sentinel worst-case
/// fitness vector and the run continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error("Backtest produced no trades")]
    NoTrades,

    #[error("Evaluator did not report objective '{name}'")]
    MissingObjective { name: String },

    #[error("Objective '{name}' is not finite ({value})")]
    NonFiniteObjective { name: String, value: f64 },

    #[error("Backtest failed: {reason}")]
    Backtest { reason: String },
}

/// A progress or results sink could not be reached in time
#[derive(Debug, Error)]
pub enum SinkDeliveryError {
    #[error("Sink unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Sink did not respond within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_formatting() {
        let error = ConfigurationError::EliteSizeOutOfRange {
            elite_size: 30,
            population_size: 20,
        };

        let msg = error.to_string();
        assert!(msg.contains("elite_size=30"));
        assert!(msg.contains("population_size=20"));
    }

    #[test]
    fn test_optimizer_error_wraps_configuration() {
        let error: OptimizerError = ConfigurationError::NoIterations.into();
        assert!(matches!(
            error,
            OptimizerError::Configuration(ConfigurationError::NoIterations)
        ));
        assert!(error.to_string().starts_with("Invalid configuration"));
    }

    #[test]
    fn test_sink_timeout_formatting() {
        let error = SinkDeliveryError::Timeout { duration_ms: 2000 };
        assert!(error.to_string().contains("2000ms"));
    }
}
