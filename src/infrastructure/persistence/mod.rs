//! Results sinks for checkpoints

pub mod checkpoint_store;
pub mod in_memory;

pub use checkpoint_store::CheckpointStore;
pub use in_memory::InMemoryResultsSink;
