// packages/engine/src/lib.rs
//! Liveroom Simulation Engine Library
//!
//! Load-tests the live-streaming platform by running large numbers of
//! virtual audience members ("bots") that concurrently enter rooms, chat and
//! recharge over a bounded time window.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **executor**: batch validation, provisioning, fan-out and aggregation
//! - **runtime**: worker pool, actor behavior loop, behavior profiles, stats
//! - **state**: task registry and idempotency guard (the shared state)
//! - **gateway**: interface to the room/chat/payment services, plus an
//!   in-process simulated implementation
//! - **observability**: tracing and Prometheus metrics setup
//! - **utils**: configuration, errors and the clock abstraction

// Public module exports
pub mod executor;
pub mod gateway;
pub mod observability;
pub mod runtime;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use executor::{BatchSpec, OrchestratorConfig, SimulationOrchestrator, TaskHandle};
pub use gateway::{ExternalGateway, GatewayError, SimulatedGateway};
pub use runtime::{BatchResult, BehaviorProfile, BehaviorStats};
pub use state::{IdempotencyGuard, TaskRegistry, TaskSnapshot, TaskStatus};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
