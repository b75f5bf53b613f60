//! Runtime settings for the optimization controller, parsed from
//! environment variables.

use crate::domain::errors::ConfigurationError;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Controller knobs that are independent of the search itself
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Upper bound on concurrent fitness evaluations
    pub evaluation_concurrency: usize,
    pub heartbeat_interval: Duration,
    /// Every N-th generation snapshot is flagged as a full refresh
    pub full_refresh_every: u64,
    /// Checkpoint epoch length, in generations
    pub checkpoint_every: u64,
    /// Upper bound on a single results-sink write
    pub sink_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            evaluation_concurrency: 4,
            heartbeat_interval: Duration::from_secs(5),
            full_refresh_every: 10,
            checkpoint_every: 5,
            sink_timeout: Duration::from_millis(2000),
        }
    }
}

impl ControllerSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.evaluation_concurrency == 0 {
            return Err(ConfigurationError::InvalidRuntimeSetting {
                setting: "evaluation_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigurationError::InvalidRuntimeSetting {
                setting: "heartbeat_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.full_refresh_every == 0 {
            return Err(ConfigurationError::InvalidRuntimeSetting {
                setting: "full_refresh_every",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigurationError::InvalidRuntimeSetting {
                setting: "checkpoint_every",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Runtime environment configuration
#[derive(Debug, Clone)]
pub struct RuntimeEnvConfig {
    pub evaluation_concurrency: usize,
    pub heartbeat_secs: u64,
    pub full_refresh_every: u64,
    pub checkpoint_every: u64,
    pub sink_timeout_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for RuntimeEnvConfig {
    fn default() -> Self {
        let settings = ControllerSettings::default();
        Self {
            evaluation_concurrency: settings.evaluation_concurrency,
            heartbeat_secs: settings.heartbeat_interval.as_secs(),
            full_refresh_every: settings.full_refresh_every,
            checkpoint_every: settings.checkpoint_every,
            sink_timeout_ms: settings.sink_timeout.as_millis() as u64,
            output_dir: PathBuf::from("checkpoints"),
        }
    }
}

impl RuntimeEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            evaluation_concurrency: Self::parse(
                "OPTIMIZER_EVALUATION_CONCURRENCY",
                defaults.evaluation_concurrency,
            )?,
            heartbeat_secs: Self::parse("OPTIMIZER_HEARTBEAT_SECS", defaults.heartbeat_secs)?,
            full_refresh_every: Self::parse(
                "OPTIMIZER_FULL_REFRESH_EVERY",
                defaults.full_refresh_every,
            )?,
            checkpoint_every: Self::parse("OPTIMIZER_CHECKPOINT_EVERY", defaults.checkpoint_every)?,
            sink_timeout_ms: Self::parse("OPTIMIZER_SINK_TIMEOUT_MS", defaults.sink_timeout_ms)?,
            output_dir: env::var("OPTIMIZER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            evaluation_concurrency: self.evaluation_concurrency,
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            full_refresh_every: self.full_refresh_every,
            checkpoint_every: self.checkpoint_every,
            sink_timeout: Duration::from_millis(self.sink_timeout_ms),
        }
    }

    fn parse<T>(key: &str, default: T) -> Result<T>
    where
        T: FromStr + ToString,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<T>()
            .context(format!("Failed to parse {}", key))
    }
}
