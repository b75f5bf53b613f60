// Genetic search over strategy parameters
pub mod optimization;
