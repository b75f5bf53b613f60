pub mod individual;
pub mod objective;
pub mod parameter_space;
pub mod pareto;
pub mod run_state;
pub mod selection;

pub use individual::{EliteRecord, Individual};
pub use objective::{Direction, Fitness, ObjectiveSet, ObjectiveSpec};
pub use parameter_space::{GeneDomain, GeneSpec, GeneValue, Genome, ParameterSpace};
pub use pareto::{IdealPoint, ParetoSelector};
pub use run_state::{
    GenerationSnapshot, GenerationSummary, Heartbeat, ObjectiveStats, ProgressEvent, RunState,
    RunStatus,
};
pub use selection::{ParentSelector, SelectionAlgorithm};
