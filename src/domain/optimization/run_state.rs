use crate::domain::optimization::individual::{EliteRecord, Individual};
use crate::domain::optimization::objective::{Direction, ObjectiveSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an optimization run.
///
/// `Idle -> Running <-> Paused`, `Running -> Completed`,
/// `Running | Paused -> Stopped`. Completed and Stopped are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Stopped)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Completed => "COMPLETED",
            RunState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Aggregate of one objective over a generation's finite values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveStats {
    pub name: String,
    pub best: Option<f64>,
    pub mean: Option<f64>,
    pub worst: Option<f64>,
}

/// Per-generation summary appended to the run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u64,
    pub objectives: Vec<ObjectiveStats>,
    pub evaluated: usize,
    pub evaluation_failures: usize,
    pub front_zero_size: usize,
    pub elite_size: usize,
    pub duration_ms: u64,
}

impl GenerationSummary {
    /// Summarizes raw objective values of `population`, best/worst taken in
    /// each objective's own direction. Sentinel values are excluded.
    pub fn from_population(
        generation: u64,
        objectives: &ObjectiveSet,
        population: &[Individual],
    ) -> Self {
        let stats = objectives
            .iter()
            .map(|objective| {
                let values: Vec<f64> = population
                    .iter()
                    .filter_map(|ind| ind.fitness())
                    .filter_map(|f| f.value(&objective.name))
                    .filter(|v| v.is_finite())
                    .collect();

                if values.is_empty() {
                    return ObjectiveStats {
                        name: objective.name.clone(),
                        best: None,
                        mean: None,
                        worst: None,
                    };
                }

                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let (best, worst) = match objective.direction {
                    Direction::Maximize => (max, min),
                    Direction::Minimize => (min, max),
                };

                ObjectiveStats {
                    name: objective.name.clone(),
                    best: Some(best),
                    mean: Some(mean),
                    worst: Some(worst),
                }
            })
            .collect();

        Self {
            generation,
            objectives: stats,
            evaluated: population.iter().filter(|i| i.is_evaluated()).count(),
            evaluation_failures: population
                .iter()
                .filter(|i| i.fitness().is_some_and(|f| f.is_failure()))
                .count(),
            front_zero_size: population.iter().filter(|i| i.rank == 0).count(),
            elite_size: 0,
            duration_ms: 0,
        }
    }
}

/// Immutable record emitted once per generation boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub run_id: String,
    pub generation: u64,
    pub number_of_iterations: u64,
    pub summary: GenerationSummary,
    /// Complete elite set, front-major, distance-minor
    pub elite: Vec<EliteRecord>,
    pub elite_added: Vec<u64>,
    pub elite_removed: Vec<u64>,
    /// Sink should replace its state rather than apply the deltas
    pub full_refresh: bool,
    pub timestamp: DateTime<Utc>,
}

/// Liveness signal emitted on a wall-clock interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub run_id: String,
    pub state: RunState,
    pub generation: u64,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Everything a progress sink can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Generation(GenerationSnapshot),
    Heartbeat(Heartbeat),
}

impl ProgressEvent {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ProgressEvent::Heartbeat(_))
    }
}

/// Point-in-time view of a run, as returned by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub state: RunState,
    pub generation: u64,
    pub number_of_iterations: u64,
    pub stop_requested: bool,
    pub elite: Vec<EliteRecord>,
    pub evaluation_failures: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    pub fn idle(run_id: String) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            generation: 0,
            number_of_iterations: 0,
            stop_requested: false,
            elite: Vec::new(),
            evaluation_failures: 0,
            started_at: None,
            finished_at: None,
            updated_at: Utc::now(),
        }
    }
}
