//! Progress sink that prints structured JSON lines to stdout.
//!
//! Each event becomes one `PROGRESS_JSON:{...}` line so log shippers can
//! filter it out of regular output.

use crate::domain::errors::SinkDeliveryError;
use crate::domain::optimization::run_state::ProgressEvent;
use crate::domain::ports::ProgressSink;
use async_trait::async_trait;
use tracing::info;

pub const PROGRESS_PREFIX: &str = "PROGRESS_JSON:";

#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressLogSink;

impl ProgressLogSink {
    pub fn new() -> Self {
        Self
    }

    pub fn render_line(event: &ProgressEvent) -> Result<String, SinkDeliveryError> {
        let json = serde_json::to_string(event)?;
        Ok(format!("{}{}", PROGRESS_PREFIX, json))
    }
}

#[async_trait]
impl ProgressSink for ProgressLogSink {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), SinkDeliveryError> {
        let line = Self::render_line(&event)?;
        println!("{}", line);

        match &event {
            ProgressEvent::Generation(snapshot) => {
                let best = snapshot
                    .summary
                    .objectives
                    .iter()
                    .map(|o| match o.best {
                        Some(v) => format!("{}={:.4}", o.name, v),
                        None => format!("{}=n/a", o.name),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                info!(
                    "Generation {}/{} | elite {} | best: {}",
                    snapshot.generation,
                    snapshot.number_of_iterations,
                    snapshot.elite.len(),
                    best
                );
            }
            ProgressEvent::Heartbeat(heartbeat) => {
                info!(
                    "Heartbeat: {} at generation {} (uptime {}s)",
                    heartbeat.state, heartbeat.generation, heartbeat.uptime_seconds
                );
            }
        }
        Ok(())
    }
}
