use crate::domain::errors::{EvaluationFailure, SinkDeliveryError};
use crate::domain::optimization::individual::EliteRecord;
use crate::domain::optimization::parameter_space::Genome;
use crate::domain::optimization::run_state::{GenerationSummary, ProgressEvent, RunState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OHLCV bar of pre-materialized history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Opaque handle to historical data the evaluator replays.
///
/// How it is built (ingestion, aggregation, indicator precomputation) is
/// not the optimizer's concern; it only needs identity and emptiness.
pub trait DatasetHandle: Send + Sync + 'static {
    /// Stable identity recorded in checkpoints
    fn dataset_id(&self) -> String;

    /// Replays the bars in chronological order
    fn replay(&self) -> &[Bar];

    fn is_empty(&self) -> bool {
        self.replay().is_empty()
    }
}

/// Output of a successful evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Objective name -> raw value, in each objective's own direction
    pub metrics: BTreeMap<String, f64>,
    /// Free-form numbers for logging (trade count, exposure, ...)
    pub diagnostics: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn new(metrics: BTreeMap<String, f64>) -> Self {
        Self {
            metrics,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn with_diagnostic(mut self, name: &str, value: f64) -> Self {
        self.diagnostics.insert(name.to_string(), value);
        self
    }
}

/// Turns a parameter configuration into performance numbers.
///
/// Must be effectively pure for a fixed dataset. Calls may be slow and are
/// issued from a bounded worker pool, several at a time.
pub trait FitnessEvaluator: Send + Sync + 'static {
    type Dataset: DatasetHandle;

    fn evaluate(
        &self,
        genes: &Genome,
        dataset: &Self::Dataset,
    ) -> Result<Evaluation, EvaluationFailure>;
}

/// Receives progress events. `emit` must return promptly and never block
/// the caller on a slow consumer.
pub trait ProgressReporter: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Slow, fallible downstream consumer of progress events
#[async_trait]
pub trait ProgressSink: Send + Sync + 'static {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), SinkDeliveryError>;
}

/// Run metadata and elite written at each checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub run_id: String,
    pub epoch: u64,
    pub generation: u64,
    pub state: RunState,
    pub dataset_id: String,
    /// Hyperparameters of the run, as configured
    pub hyperparameters: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub written_at: DateTime<Utc>,
    pub elite: Vec<EliteRecord>,
    pub latest_summary: Option<GenerationSummary>,
}

/// Durable destination for checkpoints. Each write must be atomic: a crash
/// mid-write leaves the previous checkpoint intact.
#[async_trait]
pub trait ResultsSink: Send + Sync + 'static {
    async fn write(
        &self,
        run_id: &str,
        epoch: u64,
        payload: &CheckpointPayload,
    ) -> Result<(), SinkDeliveryError>;
}
