//! Shared fixtures for controller-level tests.
#![allow(dead_code)]

use evotrade::application::optimization::OptimizationController;
use evotrade::config::{ControllerSettings, OptimizationConfig};
use evotrade::domain::errors::EvaluationFailure;
use evotrade::domain::optimization::{
    GenerationSnapshot, GeneSpec, Genome, ObjectiveSpec, ProgressEvent, RunStatus,
    SelectionAlgorithm,
};
use evotrade::domain::ports::{Bar, DatasetHandle, Evaluation, FitnessEvaluator, ProgressReporter};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct Bars(pub Vec<Bar>);

impl DatasetHandle for Bars {
    fn dataset_id(&self) -> String {
        "synthetic-bars".to_string()
    }

    fn replay(&self) -> &[Bar] {
        &self.0
    }
}

pub fn bars(count: usize) -> Arc<Bars> {
    Arc::new(Bars(
        (0..count)
            .map(|i| Bar {
                timestamp: i as i64,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000.0,
            })
            .collect(),
    ))
}

#[derive(Debug, Clone, Copy)]
pub enum Landscape {
    /// profit = x, drawdown = 40 - x: both objectives improve with x, so
    /// front 0 is exactly the copies of the best x
    Aligned,
    /// profit = x + y, drawdown = x: a genuine trade-off
    Tradeoff,
}

/// Pure evaluator over genes `x`, `y` (integers) and `signal`
/// (categorical). `signal = "none"` never trades.
pub struct ScriptedEvaluator {
    landscape: Landscape,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(landscape: Landscape, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            landscape,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FitnessEvaluator for ScriptedEvaluator {
    type Dataset = Bars;

    fn evaluate(&self, genes: &Genome, _dataset: &Bars) -> Result<Evaluation, EvaluationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if genes["signal"].as_str() == Some("none") {
            return Err(EvaluationFailure::NoTrades);
        }

        let x = genes["x"].as_f64().unwrap_or_default();
        let y = genes["y"].as_f64().unwrap_or_default();
        let (profit, drawdown) = match self.landscape {
            Landscape::Aligned => (x, 40.0 - x),
            Landscape::Tradeoff => (x + y, x),
        };

        Ok(Evaluation::new(BTreeMap::from([
            ("profit".to_string(), profit),
            ("drawdown".to_string(), drawdown),
        ]))
        .with_diagnostic("trades", 1.0))
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<GenerationSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Generation(snapshot) => Some(snapshot),
                ProgressEvent::Heartbeat(_) => None,
            })
            .collect()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.events().iter().filter(|e| e.is_heartbeat()).count()
    }
}

impl ProgressReporter for RecordingReporter {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn config(
    population_size: usize,
    number_of_iterations: u64,
    elite_size: usize,
) -> OptimizationConfig {
    OptimizationConfig {
        population_size,
        number_of_iterations,
        propagation_fraction: 0.6,
        elite_size,
        chance_of_mutation: 0.1,
        selection_algorithm: SelectionAlgorithm::Tournament,
        tournament_size: 3,
        objectives: vec![
            ObjectiveSpec::maximize("profit"),
            ObjectiveSpec::minimize("drawdown"),
        ],
        parameters: vec![
            GeneSpec::integer("x", 0, 40, 1),
            GeneSpec::integer("y", 0, 40, 1),
            GeneSpec::categorical("signal", &["cross", "none"]),
        ],
        seed: Some(42),
    }
}

pub fn settings() -> ControllerSettings {
    ControllerSettings {
        evaluation_concurrency: 4,
        heartbeat_interval: Duration::from_millis(50),
        full_refresh_every: 10,
        checkpoint_every: 5,
        sink_timeout: Duration::from_millis(500),
    }
}

/// Polls the controller status until `predicate` holds
pub async fn wait_for_status<E, F>(
    controller: &OptimizationController<E>,
    predicate: F,
) -> RunStatus
where
    E: FitnessEvaluator,
    F: Fn(&RunStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = controller.status().await;
        if predicate(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "status condition not reached: {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Polls until the evaluator has been called at least `count` times
pub async fn wait_for_calls(evaluator: &ScriptedEvaluator, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while evaluator.calls() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "evaluator reached only {} calls",
            evaluator.calls()
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
