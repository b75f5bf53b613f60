//! Best-effort durable checkpoints of the elite set.
//!
//! Epochs are numbered 1, 2, ... in write order and are independent of the
//! generation counter: a checkpoint is due every `checkpoint_every`
//! generations and once more at termination. Sink errors and timeouts are
//! logged and counted, never returned to the loop.

use crate::config::{ControllerSettings, OptimizationConfig};
use crate::domain::errors::SinkDeliveryError;
use crate::domain::optimization::individual::EliteRecord;
use crate::domain::optimization::run_state::{GenerationSummary, RunState};
use crate::domain::ports::{CheckpointPayload, ResultsSink};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ResultsPersister {
    sink: Arc<dyn ResultsSink>,
    timeout: Duration,
    checkpoint_every: u64,
    run_id: String,
    dataset_id: String,
    hyperparameters: serde_json::Value,
    started_at: DateTime<Utc>,
    epoch: u64,
    failures: u64,
    last_generation: Option<u64>,
}

impl ResultsPersister {
    pub fn new(
        sink: Arc<dyn ResultsSink>,
        settings: &ControllerSettings,
        run_id: &str,
        dataset_id: &str,
        config: &OptimizationConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        let hyperparameters = serde_json::to_value(config).unwrap_or_else(|e| {
            warn!("Persister: Could not serialize hyperparameters: {}", e);
            serde_json::Value::Null
        });

        Self {
            sink,
            timeout: settings.sink_timeout,
            checkpoint_every: settings.checkpoint_every,
            run_id: run_id.to_string(),
            dataset_id: dataset_id.to_string(),
            hyperparameters,
            started_at,
            epoch: 0,
            failures: 0,
            last_generation: None,
        }
    }

    /// True when `generation` closes an epoch
    pub fn is_due(&self, generation: u64) -> bool {
        generation > 0 && generation % self.checkpoint_every == 0
    }

    /// Last epoch attempted
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Generation of the last successful checkpoint
    pub fn last_generation(&self) -> Option<u64> {
        self.last_generation
    }

    /// Writes one checkpoint. Returns whether the sink accepted it.
    pub async fn checkpoint(
        &mut self,
        generation: u64,
        state: RunState,
        elite: Vec<EliteRecord>,
        latest_summary: Option<GenerationSummary>,
    ) -> bool {
        self.epoch += 1;
        let payload = CheckpointPayload {
            run_id: self.run_id.clone(),
            epoch: self.epoch,
            generation,
            state,
            dataset_id: self.dataset_id.clone(),
            hyperparameters: self.hyperparameters.clone(),
            started_at: self.started_at,
            written_at: Utc::now(),
            elite,
            latest_summary,
        };

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.sink.write(&self.run_id, self.epoch, &payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SinkDeliveryError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(()) => {
                self.last_generation = Some(generation);
                info!(
                    "Persister: Epoch {} written (generation {}, state {}, elite {})",
                    self.epoch,
                    generation,
                    state,
                    payload.elite.len()
                );
                true
            }
            Err(e) => {
                self.failures += 1;
                warn!(
                    "Persister: Epoch {} for generation {} not written: {}",
                    self.epoch, generation, e
                );
                false
            }
        }
    }
}
