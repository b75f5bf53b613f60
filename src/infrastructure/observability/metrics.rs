//! Prometheus metrics definitions for Evotrade
//!
//! All metrics use the `evotrade_` prefix and are read-only.

use prometheus::{
    Counter, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for optimization runs
#[derive(Clone)]
pub struct OptimizerMetrics {
    registry: Arc<Registry>,
    /// Completed generations across all runs
    pub generations_total: IntCounter,
    /// Fitness evaluations performed
    pub evaluations_total: Counter,
    /// Evaluations scored with the worst-case sentinel
    pub evaluation_failures_total: Counter,
    /// Current elite set size
    pub elite_size: GenericGauge<AtomicF64>,
    /// Last completed generation
    pub current_generation: GenericGauge<AtomicF64>,
    /// Progress and checkpoint deliveries that failed or timed out
    pub sink_failures_total: Counter,
    /// Wall-clock time per generation
    pub generation_duration_seconds: Histogram,
}

impl OptimizerMetrics {
    /// Create a new metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let generations_total = IntCounter::with_opts(Opts::new(
            "evotrade_generations_total",
            "Total completed generations",
        ))?;
        registry.register(Box::new(generations_total.clone()))?;

        let evaluations_total = Counter::with_opts(Opts::new(
            "evotrade_evaluations_total",
            "Total fitness evaluations",
        ))?;
        registry.register(Box::new(evaluations_total.clone()))?;

        let evaluation_failures_total = Counter::with_opts(Opts::new(
            "evotrade_evaluation_failures_total",
            "Fitness evaluations that failed and received the worst-case score",
        ))?;
        registry.register(Box::new(evaluation_failures_total.clone()))?;

        let elite_size = Gauge::with_opts(Opts::new(
            "evotrade_elite_size",
            "Number of individuals in the elite set",
        ))?;
        registry.register(Box::new(elite_size.clone()))?;

        let current_generation = Gauge::with_opts(Opts::new(
            "evotrade_current_generation",
            "Last completed generation",
        ))?;
        registry.register(Box::new(current_generation.clone()))?;

        let sink_failures_total = Counter::with_opts(Opts::new(
            "evotrade_sink_failures_total",
            "Checkpoint writes that failed or timed out",
        ))?;
        registry.register(Box::new(sink_failures_total.clone()))?;

        let generation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "evotrade_generation_duration_seconds",
                "Wall-clock duration of one generation",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        )?;
        registry.register(Box::new(generation_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            generations_total,
            evaluations_total,
            evaluation_failures_total,
            elite_size,
            current_generation,
            sink_failures_total,
            generation_duration_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Record one closed generation
    pub fn record_generation(
        &self,
        generation: u64,
        evaluated: usize,
        failures: usize,
        elite_size: usize,
        duration_secs: f64,
    ) {
        self.generations_total.inc();
        self.evaluations_total.inc_by(evaluated as f64);
        self.evaluation_failures_total.inc_by(failures as f64);
        self.elite_size.set(elite_size as f64);
        self.current_generation.set(generation as f64);
        self.generation_duration_seconds.observe(duration_secs);
    }
}
