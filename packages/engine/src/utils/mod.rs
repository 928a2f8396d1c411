// packages/engine/src/utils/mod.rs
//! Common utilities shared across the engine
//!
//! - **errors**: engine-wide error type and `Result` alias
//! - **config**: layered configuration (defaults → file → environment)
//! - **clock**: injectable time source used by every simulated delay

pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, TokioClock};
pub use config::EngineConfig;
pub use errors::{EngineError, Result};
