//! File-backed checkpoint sink.
//!
//! Each run keeps one JSON document, `<dir>/<run_id>.json`, replaced
//! atomically on every epoch so a crash mid-write leaves the previous
//! checkpoint readable. Renames are ordered by epoch: a write that
//! finishes after a newer epoch was committed is discarded.

use crate::domain::errors::SinkDeliveryError;
use crate::domain::ports::{CheckpointPayload, ResultsSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Highest committed epoch per run id
type CommitLog = Arc<Mutex<HashMap<String, u64>>>;

pub struct CheckpointStore {
    dir: PathBuf,
    committed: CommitLog,
}

impl CheckpointStore {
    /// Creates the checkpoint directory if it does not exist yet
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create checkpoint directory {:?}", dir))?;
        }
        Ok(Self {
            dir,
            committed: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Most recent checkpoint of `run_id`, if any was written
    pub fn load_latest(&self, run_id: &str) -> Result<Option<CheckpointPayload>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).context("Failed to read checkpoint file")?;
        let payload: CheckpointPayload =
            serde_json::from_str(&content).context("Failed to parse checkpoint JSON")?;

        info!(
            "CheckpointStore: Loaded epoch {} of run {} from {:?}",
            payload.epoch, run_id, path
        );
        Ok(Some(payload))
    }
}

fn validate_run_id(run_id: &str) -> Result<(), SinkDeliveryError> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SinkDeliveryError::Unavailable {
            reason: format!("run id {:?} is not a valid file name", run_id),
        })
    }
}

struct PendingWrite {
    run_id: String,
    epoch: u64,
    target: PathBuf,
    temp: PathBuf,
    content: String,
}

/// Writes and syncs the temp file, then renames it over the target unless a
/// newer epoch of the same run is already committed. Returns whether the
/// rename happened.
fn commit_in_order(
    committed: &Mutex<HashMap<String, u64>>,
    write: PendingWrite,
) -> io::Result<bool> {
    let mut file = File::create(&write.temp)?;
    file.write_all(write.content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    let mut committed = committed.lock().unwrap_or_else(|e| e.into_inner());
    let newest = committed.get(&write.run_id).copied();
    if newest.is_some_and(|newest| newest >= write.epoch) {
        fs::remove_file(&write.temp)?;
        return Ok(false);
    }

    fs::rename(&write.temp, &write.target)?;
    committed.insert(write.run_id, write.epoch);
    Ok(true)
}

#[async_trait]
impl ResultsSink for CheckpointStore {
    async fn write(
        &self,
        run_id: &str,
        epoch: u64,
        payload: &CheckpointPayload,
    ) -> Result<(), SinkDeliveryError> {
        validate_run_id(run_id)?;
        let content = serde_json::to_string_pretty(payload)?;

        let pending = PendingWrite {
            run_id: run_id.to_string(),
            epoch,
            target: self.path_for(run_id),
            temp: self.dir.join(format!("{}.{}.tmp", run_id, epoch)),
            content,
        };

        // Keeps running if the caller times out; ordering is enforced inside
        let committed = Arc::clone(&self.committed);
        let renamed = tokio::task::spawn_blocking(move || commit_in_order(&committed, pending))
            .await
            .map_err(|e| SinkDeliveryError::Unavailable {
                reason: e.to_string(),
            })??;

        if renamed {
            debug!("CheckpointStore: Epoch {} of run {} committed", epoch, run_id);
        } else {
            warn!(
                "CheckpointStore: Epoch {} of run {} discarded, a newer epoch is already on disk",
                epoch, run_id
            );
        }
        Ok(())
    }
}
