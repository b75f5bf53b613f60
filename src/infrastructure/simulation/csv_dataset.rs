use crate::domain::ports::{Bar, DatasetHandle};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// OHLCV history loaded once from a CSV file with the header
/// `timestamp,open,high,low,close,volume`
#[derive(Debug, Clone)]
pub struct CsvDataset {
    id: String,
    bars: Vec<Bar>,
}

impl CsvDataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;

        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize::<Bar>().enumerate() {
            let bar = result.with_context(|| format!("Invalid bar at record {}", line + 1))?;
            bars.push(bar);
        }

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!("CsvDataset: Loaded {} bars from {}", bars.len(), path.display());
        Ok(Self::from_bars(id, bars))
    }

    /// Bars are replayed in timestamp order regardless of input order
    pub fn from_bars(id: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            id: id.into(),
            bars,
        }
    }
}

impl DatasetHandle for CsvDataset {
    fn dataset_id(&self) -> String {
        self.id.clone()
    }

    fn replay(&self) -> &[Bar] {
        &self.bars
    }
}
