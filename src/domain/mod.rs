// Optimization domain: genes, objectives, Pareto ranking, run state
pub mod optimization;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
