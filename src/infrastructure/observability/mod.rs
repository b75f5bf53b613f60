//! Push-based observability for Evotrade
//!
//! Nothing here accepts requests. Progress is pushed as structured JSON
//! lines on stdout; Prometheus metrics are rendered on demand.

pub mod metrics;
pub mod progress_log;

pub use metrics::OptimizerMetrics;
pub use progress_log::ProgressLogSink;
