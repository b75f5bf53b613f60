//! Run lifecycle and the generational loop task.
//!
//! One controller drives exactly one run:
//! `IDLE -> RUNNING <-> PAUSED`, then `COMPLETED` or `STOPPED`.
//! Commands only touch the shared status record and the control channel.
//! The loop task owns the evolver and reacts to commands at generation
//! boundaries; no lock is held while individuals are evaluated.

use crate::application::optimization::evolver::{EvaluationWorkers, PopulationEvolver};
use crate::application::optimization::heartbeat::run_heartbeat;
use crate::application::optimization::persister::ResultsPersister;
use crate::config::{ControllerSettings, OptimizationConfig};
use crate::domain::errors::OptimizerError;
use crate::domain::optimization::individual::EliteRecord;
use crate::domain::optimization::run_state::{
    GenerationSnapshot, GenerationSummary, ProgressEvent, RunState, RunStatus,
};
use crate::domain::ports::{DatasetHandle, FitnessEvaluator, ProgressReporter, ResultsSink};
use crate::infrastructure::observability::OptimizerMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Command observed by the loop at generation boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

struct RunTasks {
    main_loop: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

pub struct OptimizationController<E: FitnessEvaluator> {
    run_id: String,
    evaluator: Arc<E>,
    dataset: Arc<E::Dataset>,
    reporter: Arc<dyn ProgressReporter>,
    sink: Arc<dyn ResultsSink>,
    settings: ControllerSettings,
    metrics: Option<OptimizerMetrics>,
    status: Arc<RwLock<RunStatus>>,
    history: Arc<RwLock<Vec<GenerationSummary>>>,
    control: watch::Sender<Control>,
    tasks: Mutex<Option<RunTasks>>,
}

impl<E: FitnessEvaluator> OptimizationController<E> {
    pub fn new(
        evaluator: Arc<E>,
        dataset: Arc<E::Dataset>,
        reporter: Arc<dyn ProgressReporter>,
        sink: Arc<dyn ResultsSink>,
        settings: ControllerSettings,
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let (control, _) = watch::channel(Control::Run);

        Self {
            status: Arc::new(RwLock::new(RunStatus::idle(run_id.clone()))),
            run_id,
            evaluator,
            dataset,
            reporter,
            sink,
            settings,
            metrics: None,
            history: Arc::new(RwLock::new(Vec::new())),
            control,
            tasks: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: OptimizerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Validates everything up front, then spawns the loop and heartbeat
    /// tasks. On any error the controller stays IDLE and nothing is spawned.
    pub async fn start(&self, config: OptimizationConfig) -> Result<(), OptimizerError> {
        let mut status = self.status.write().await;
        if status.state != RunState::Idle {
            return Err(OptimizerError::AlreadyStarted);
        }

        config.validate()?;
        self.settings.validate()?;
        if self.dataset.is_empty() {
            return Err(OptimizerError::EmptyDataset {
                dataset_id: self.dataset.dataset_id(),
            });
        }

        let evolver = PopulationEvolver::new(&config)?;
        let workers = EvaluationWorkers::new(self.settings.evaluation_concurrency)?;

        let started_at = Utc::now();
        let persister = ResultsPersister::new(
            Arc::clone(&self.sink),
            &self.settings,
            &self.run_id,
            &self.dataset.dataset_id(),
            &config,
            started_at,
        );

        status.state = RunState::Running;
        status.number_of_iterations = config.number_of_iterations;
        status.started_at = Some(started_at);
        status.updated_at = started_at;
        drop(status);

        self.control.send_replace(Control::Run);

        let run = GenerationalLoop {
            run_id: self.run_id.clone(),
            evaluator: Arc::clone(&self.evaluator),
            dataset: Arc::clone(&self.dataset),
            reporter: Arc::clone(&self.reporter),
            metrics: self.metrics.clone(),
            status: Arc::clone(&self.status),
            history: Arc::clone(&self.history),
            settings: self.settings.clone(),
            number_of_iterations: config.number_of_iterations,
            evolver,
            workers,
            persister,
        };

        let main_loop = tokio::spawn(run.drive(self.control.subscribe()));
        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&self.status),
            Arc::clone(&self.reporter),
            self.settings.heartbeat_interval,
        ));
        *self.tasks.lock().await = Some(RunTasks {
            main_loop,
            heartbeat,
        });

        info!(
            "Controller: Run {} started (population={}, iterations={}, workers={})",
            self.run_id,
            config.population_size,
            config.number_of_iterations,
            self.settings.evaluation_concurrency
        );
        Ok(())
    }

    /// RUNNING -> PAUSED. The loop parks at the next generation boundary.
    pub async fn pause(&self) -> Result<(), OptimizerError> {
        let mut status = self.status.write().await;
        if status.state != RunState::Running || status.stop_requested {
            return Err(invalid_transition("pause", &status));
        }
        status.state = RunState::Paused;
        status.updated_at = Utc::now();
        self.control.send_replace(Control::Pause);
        info!("Controller: Pause requested at generation {}", status.generation);
        Ok(())
    }

    /// PAUSED -> RUNNING
    pub async fn resume(&self) -> Result<(), OptimizerError> {
        let mut status = self.status.write().await;
        if status.state != RunState::Paused || status.stop_requested {
            return Err(invalid_transition("resume", &status));
        }
        status.state = RunState::Running;
        status.updated_at = Utc::now();
        self.control.send_replace(Control::Run);
        info!("Controller: Resumed at generation {}", status.generation);
        Ok(())
    }

    /// Requests termination at the next generation boundary. The state
    /// becomes STOPPED once final persistence is done. Repeated calls while
    /// the stop is pending are no-ops.
    pub async fn stop(&self) -> Result<(), OptimizerError> {
        let mut status = self.status.write().await;
        match status.state {
            RunState::Running | RunState::Paused => {
                if !status.stop_requested {
                    status.stop_requested = true;
                    status.updated_at = Utc::now();
                    self.control.send_replace(Control::Stop);
                    info!("Controller: Stop requested at generation {}", status.generation);
                }
                Ok(())
            }
            _ => Err(invalid_transition("stop", &status)),
        }
    }

    /// Last-known-good view of the run
    pub async fn status(&self) -> RunStatus {
        self.status.read().await.clone()
    }

    /// Per-generation summaries, oldest first
    pub async fn history(&self) -> Vec<GenerationSummary> {
        self.history.read().await.clone()
    }

    /// Waits for the loop task to finish and returns the final status.
    /// Returns immediately when the run was never started.
    pub async fn wait(&self) -> RunStatus {
        let tasks = self.tasks.lock().await.take();
        if let Some(tasks) = tasks {
            if let Err(e) = tasks.main_loop.await {
                error!("Controller: Loop task for run {} aborted: {}", self.run_id, e);
                let mut status = self.status.write().await;
                if !status.state.is_terminal() {
                    status.state = RunState::Stopped;
                    status.finished_at = Some(Utc::now());
                    status.updated_at = Utc::now();
                }
            }
            tasks.heartbeat.abort();
        }
        self.status().await
    }
}

fn invalid_transition(command: &'static str, status: &RunStatus) -> OptimizerError {
    OptimizerError::InvalidTransition {
        command,
        state: status.state.to_string(),
    }
}

/// State moved into the loop task
struct GenerationalLoop<E: FitnessEvaluator> {
    run_id: String,
    evaluator: Arc<E>,
    dataset: Arc<E::Dataset>,
    reporter: Arc<dyn ProgressReporter>,
    metrics: Option<OptimizerMetrics>,
    status: Arc<RwLock<RunStatus>>,
    history: Arc<RwLock<Vec<GenerationSummary>>>,
    settings: ControllerSettings,
    number_of_iterations: u64,
    evolver: PopulationEvolver,
    workers: EvaluationWorkers,
    persister: ResultsPersister,
}

impl<E: FitnessEvaluator> GenerationalLoop<E> {
    async fn drive(mut self, mut control: watch::Receiver<Control>) {
        let final_state = loop {
            let started = Instant::now();
            let stats = self
                .evolver
                .evaluate_pending(&self.evaluator, &self.dataset, &self.workers)
                .await;

            let mut outcome = match self.evolver.close_generation() {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Controller: Generation could not close: {}", e);
                    break RunState::Stopped;
                }
            };
            outcome.summary.duration_ms = started.elapsed().as_millis() as u64;
            let generation = outcome.generation;

            if stats.failures > 0 {
                info!(
                    "Controller: Generation {} had {} of {} evaluations scored as worst case",
                    generation, stats.failures, stats.evaluated
                );
            }

            let elite = self.elite_records();
            self.publish(&outcome.summary, &elite, stats.failures).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_generation(
                    generation,
                    stats.evaluated,
                    stats.failures,
                    elite.len(),
                    started.elapsed().as_secs_f64(),
                );
            }

            let full_refresh = generation == 1
                || generation % self.settings.full_refresh_every == 0
                || generation >= self.number_of_iterations;
            self.reporter
                .emit(ProgressEvent::Generation(GenerationSnapshot {
                    run_id: self.run_id.clone(),
                    generation,
                    number_of_iterations: self.number_of_iterations,
                    summary: outcome.summary.clone(),
                    elite: elite.clone(),
                    elite_added: outcome.elite_added,
                    elite_removed: outcome.elite_removed,
                    full_refresh,
                    timestamp: Utc::now(),
                }));

            if generation >= self.number_of_iterations {
                break RunState::Completed;
            }
            if *control.borrow() == Control::Stop {
                break RunState::Stopped;
            }

            if self.persister.is_due(generation) {
                let written = self
                    .persister
                    .checkpoint(generation, RunState::Running, elite, Some(outcome.summary))
                    .await;
                self.count_sink_failure(written);
            }

            if hold_at_boundary(&mut control, generation).await {
                break RunState::Stopped;
            }

            self.evolver.breed_next_generation();
        };

        self.finish(final_state).await;
    }

    fn elite_records(&self) -> Vec<EliteRecord> {
        self.evolver.elite().iter().map(|i| i.to_record()).collect()
    }

    async fn publish(&self, summary: &GenerationSummary, elite: &[EliteRecord], failures: usize) {
        self.history.write().await.push(summary.clone());

        let mut status = self.status.write().await;
        status.generation = summary.generation;
        status.elite = elite.to_vec();
        status.evaluation_failures += failures as u64;
        status.updated_at = Utc::now();
    }

    fn count_sink_failure(&self, written: bool) {
        if !written && let Some(metrics) = &self.metrics {
            metrics.sink_failures_total.inc();
        }
    }

    async fn finish(mut self, final_state: RunState) {
        let generation = self.evolver.generation();
        let latest = self.history.read().await.last().cloned();
        let elite = self.elite_records();

        let written = self
            .persister
            .checkpoint(generation, final_state, elite, latest)
            .await;
        self.count_sink_failure(written);

        let mut status = self.status.write().await;
        status.state = final_state;
        status.finished_at = Some(Utc::now());
        status.updated_at = Utc::now();
        drop(status);

        if self.persister.failures() > 0 {
            warn!(
                "Controller: Run {} had {} failed checkpoint writes",
                self.run_id,
                self.persister.failures()
            );
        }
        info!(
            "Controller: Run {} finished as {} after {} generations",
            self.run_id, final_state, generation
        );
    }
}

/// Parks while paused. Returns true when the run must stop.
async fn hold_at_boundary(control: &mut watch::Receiver<Control>, generation: u64) -> bool {
    let mut announced = false;
    loop {
        let current = *control.borrow_and_update();
        match current {
            Control::Run => return false,
            Control::Stop => return true,
            Control::Pause => {
                if !announced {
                    info!("Controller: Paused at generation {}", generation);
                    announced = true;
                }
            }
        }
        if control.changed().await.is_err() {
            debug!("Controller: Control channel closed while paused");
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ConfigurationError, EvaluationFailure, SinkDeliveryError};
    use crate::domain::optimization::objective::ObjectiveSpec;
    use crate::domain::optimization::parameter_space::{GeneSpec, Genome};
    use crate::domain::optimization::selection::SelectionAlgorithm;
    use crate::domain::ports::{Bar, CheckpointPayload, Evaluation};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Bars(Vec<Bar>);

    impl DatasetHandle for Bars {
        fn dataset_id(&self) -> String {
            "unit-bars".to_string()
        }

        fn replay(&self) -> &[Bar] {
            &self.0
        }
    }

    struct SlowEvaluator {
        delay: Duration,
    }

    impl FitnessEvaluator for SlowEvaluator {
        type Dataset = Bars;

        fn evaluate(
            &self,
            genes: &Genome,
            _dataset: &Bars,
        ) -> Result<Evaluation, EvaluationFailure> {
            std::thread::sleep(self.delay);
            let x = genes["x"].as_f64().unwrap_or_default();
            Ok(Evaluation::new(BTreeMap::from([(
                "score".to_string(),
                x,
            )])))
        }
    }

    struct NullReporter;

    impl ProgressReporter for NullReporter {
        fn emit(&self, _event: ProgressEvent) {}
    }

    struct NullSink;

    #[async_trait]
    impl ResultsSink for NullSink {
        async fn write(
            &self,
            _run_id: &str,
            _epoch: u64,
            _payload: &CheckpointPayload,
        ) -> Result<(), SinkDeliveryError> {
            Ok(())
        }
    }

    fn bar() -> Bar {
        Bar {
            timestamp: 0,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    fn controller(bars: Vec<Bar>, delay_ms: u64) -> OptimizationController<SlowEvaluator> {
        OptimizationController::new(
            Arc::new(SlowEvaluator {
                delay: Duration::from_millis(delay_ms),
            }),
            Arc::new(Bars(bars)),
            Arc::new(NullReporter),
            Arc::new(NullSink),
            ControllerSettings {
                heartbeat_interval: Duration::from_millis(20),
                ..ControllerSettings::default()
            },
        )
    }

    fn config(iterations: u64) -> OptimizationConfig {
        OptimizationConfig {
            population_size: 6,
            number_of_iterations: iterations,
            propagation_fraction: 0.5,
            elite_size: 2,
            chance_of_mutation: 0.2,
            selection_algorithm: SelectionAlgorithm::Rank,
            tournament_size: 2,
            objectives: vec![ObjectiveSpec::maximize("score")],
            parameters: vec![GeneSpec::float("x", 0.0, 1.0, None)],
            seed: Some(3),
        }
    }

    #[tokio::test]
    async fn test_commands_rejected_before_start() {
        let controller = controller(vec![bar()], 0);
        assert!(matches!(
            controller.pause().await,
            Err(OptimizerError::InvalidTransition { command: "pause", .. })
        ));
        assert!(controller.resume().await.is_err());
        assert!(controller.stop().await.is_err());
        assert_eq!(controller.wait().await.state, RunState::Idle);
    }

    #[tokio::test]
    async fn test_empty_dataset_rejected() {
        let controller = controller(vec![], 0);
        let err = controller.start(config(3)).await.unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::EmptyDataset { ref dataset_id } if dataset_id == "unit-bars"
        ));
        assert_eq!(controller.status().await.state, RunState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let mut controller = controller(vec![bar()], 0);
        controller.settings.checkpoint_every = 0;
        let err = controller.start(config(3)).await.unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::Configuration(ConfigurationError::InvalidRuntimeSetting {
                setting: "checkpoint_every",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_run_completes_and_rejects_restart() {
        let controller = controller(vec![bar()], 0);
        controller.start(config(3)).await.unwrap();
        assert!(matches!(
            controller.start(config(3)).await,
            Err(OptimizerError::AlreadyStarted)
        ));

        let status = controller.wait().await;
        assert_eq!(status.state, RunState::Completed);
        assert_eq!(status.generation, 3);
        assert_eq!(status.elite.len(), 2);
        assert!(status.finished_at.is_some());
        assert_eq!(controller.history().await.len(), 3);
        assert!(matches!(
            controller.start(config(3)).await,
            Err(OptimizerError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_pause_then_stop_while_paused() {
        let controller = controller(vec![bar()], 5);
        controller.start(config(1000)).await.unwrap();
        controller.pause().await.unwrap();
        assert_eq!(controller.status().await.state, RunState::Paused);
        assert!(controller.pause().await.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let parked = controller.status().await.generation;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.status().await.generation, parked);

        controller.stop().await.unwrap();
        assert!(controller.status().await.stop_requested);
        assert!(controller.resume().await.is_err());

        let status = controller.wait().await;
        assert_eq!(status.state, RunState::Stopped);
        assert_eq!(status.generation, parked);
    }
}
