// packages/engine/src/executor/mod.rs
//! Batch orchestration
//!
//! - **Batch**: submission spec and its validation
//! - **Orchestrator**: provisioning, bounded fan-out, join and aggregation

pub mod batch;
pub mod orchestrator;

// Re-export commonly used types
pub use batch::BatchSpec;
pub use orchestrator::{OrchestratorConfig, SimulationOrchestrator, TaskHandle};
