//! In-memory results sink
//!
//! Keeps every checkpoint it receives. Used by tests and by embedders that
//! read results back in-process instead of from disk.

use crate::domain::errors::SinkDeliveryError;
use crate::domain::ports::{CheckpointPayload, ResultsSink};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryResultsSink {
    checkpoints: Arc<RwLock<Vec<CheckpointPayload>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryResultsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an unreachable backend: writes fail until re-enabled
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn checkpoints(&self) -> Vec<CheckpointPayload> {
        self.checkpoints.read().await.clone()
    }

    pub async fn latest(&self) -> Option<CheckpointPayload> {
        self.checkpoints.read().await.last().cloned()
    }
}

#[async_trait]
impl ResultsSink for InMemoryResultsSink {
    async fn write(
        &self,
        run_id: &str,
        epoch: u64,
        payload: &CheckpointPayload,
    ) -> Result<(), SinkDeliveryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SinkDeliveryError::Unavailable {
                reason: format!("in-memory sink disabled (run {}, epoch {})", run_id, epoch),
            });
        }
        self.checkpoints.write().await.push(payload.clone());
        Ok(())
    }
}
