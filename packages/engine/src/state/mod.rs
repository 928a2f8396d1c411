// packages/engine/src/state/mod.rs
//! Shared state touched by many concurrent workers
//!
//! - **Task Registry**: simulation task lifecycle, progress and live counts
//! - **Idempotency Guard**: at-most-once authorization of payment actions
//!
//! These are the only structures shared across actor loops and the only
//! points of lock contention. Both are built on `DashMap`, with every
//! mutation expressed as one atomic method.

pub mod idempotency;
pub mod task_registry;

// Re-export commonly used types
pub use idempotency::IdempotencyGuard;
pub use task_registry::{SimulationTask, TaskId, TaskRegistry, TaskSnapshot, TaskStatus};
