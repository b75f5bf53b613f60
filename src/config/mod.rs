//! Configuration module for Evotrade.
//!
//! Run hyperparameters come from a TOML file (or are built in code);
//! controller runtime knobs come from environment variables.

mod optimization_config;
mod runtime_config;

pub use optimization_config::OptimizationConfig;
pub use runtime_config::{ControllerSettings, RuntimeEnvConfig};
