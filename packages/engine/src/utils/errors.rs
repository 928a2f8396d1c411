// packages/engine/src/utils/errors.rs
//! Engine error taxonomy
//!
//! Only `Validation` and whole-batch setup failures are fatal to a
//! submission. Everything else is recorded and degrades the batch to a
//! partial result.

use crate::gateway::GatewayError;
use crate::state::task_registry::TaskStatus;
use thiserror::Error;

/// Convenience alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the simulation engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed batch spec, rejected before any side effect
    #[error("Validation error: {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A single room (and its bots) could not be provisioned
    #[error("Provisioning failed for room {room}: {reason}")]
    Provisioning { room: String, reason: String },

    /// A single enter/leave/message/recharge call failed
    #[error("Action {action} failed for actor {actor}: {reason}")]
    Action {
        action: &'static str,
        actor: String,
        reason: String,
    },

    /// A room's unit of work did not finish before the join deadline
    #[error("Room {room} did not finish within {timeout_ms}ms")]
    JoinTimeout { room: String, timeout_ms: u64 },

    /// Attempted task transition is not an edge of the state machine
    #[error("Invalid transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Progress update refused (not running, or would go backwards)
    #[error("Progress update rejected for task {task_id}: {reason}")]
    ProgressRejected { task_id: String, reason: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Worker pool semaphore was closed
    #[error("Worker pool closed")]
    PoolClosed,

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl EngineError {
    /// Creates a validation error for the given spec field.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Creates an action error.
    pub fn action(action: &'static str, actor: impl Into<String>, reason: impl ToString) -> Self {
        Self::Action {
            action,
            actor: actor.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the error should fail a submission outright.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::ConfigError(_) | Self::PoolClosed
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = EngineError::validation("room_count", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Validation error: room_count: must be greater than 0"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_partial_errors_not_fatal() {
        let timeout = EngineError::JoinTimeout {
            room: "room-1".into(),
            timeout_ms: 500,
        };
        assert!(!timeout.is_fatal());

        let action = EngineError::action("enter", "bot-1", "connection reset");
        assert!(!action.is_fatal());
        assert!(action.to_string().contains("bot-1"));
    }
}
