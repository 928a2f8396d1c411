// packages/engine/src/runtime/mod.rs
//! Actor execution runtime
//!
//! This module provides the execution environment for simulated audience
//! members:
//!
//! - **Worker Pool**: fixed number of slots bounding concurrent actor loops
//! - **Actor**: enter → message/recharge loop → leave for one bot
//! - **Behavior**: jitter ranges, probability tiers and amount ranges
//! - **Stats**: per-actor counters and their order-independent aggregation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Worker Pool (N slots)                  │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐               │
//! │  │ Actor    │  │ Actor    │  │ Actor    │  ...          │
//! │  │ loop     │  │ loop     │  │ loop     │               │
//! │  └──────────┘  └──────────┘  └──────────┘               │
//! │         ▲            ▲            ▲                     │
//! │         └────────────┴────────────┘                     │
//! │                      │                                  │
//! │          Room units (one per provisioned room)          │
//! │                      │                                  │
//! │        Thousands of requested bots, queued on slots     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod actor;
pub mod behavior;
pub mod stats;
pub mod worker_pool;

// Re-export commonly used types
pub use actor::{ActorHandle, ActorSimulator, SimulationContext};
pub use behavior::{ActionToggles, AmountRange, BehaviorProfile, JitterRange};
pub use stats::{BatchResult, BehaviorStats, RoomOutcome, RoomReport};
pub use worker_pool::{PoolStats, WorkerPool, WorkerPoolConfig};
