//! Reference dataset and evaluator used by the `optimize` binary

pub mod csv_dataset;
pub mod sma_cross;

pub use csv_dataset::CsvDataset;
pub use sma_cross::SmaCrossEvaluator;
