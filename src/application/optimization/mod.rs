// Multi-objective genetic optimization: loop, lifecycle and side channels
pub mod controller;
pub mod evolver;
pub mod heartbeat;
pub mod persister;
pub mod progress;

pub use controller::OptimizationController;
pub use evolver::{
    EvaluationStats, EvaluationWorkers, EvolverError, GenerationOutcome, PopulationEvolver,
};
pub use persister::ResultsPersister;
pub use progress::CoalescingReporter;
