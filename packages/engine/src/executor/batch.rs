// packages/engine/src/executor/batch.rs
//! Batch submission spec
//!
//! A batch asks for `room_count` rooms with `actors_per_room` bots each,
//! all running the same behavior profile for `duration_secs`. Validation
//! happens before any side effect; out-of-range values are rejected, never
//! clamped.

use crate::runtime::behavior::BehaviorProfile;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on bots per batch
pub const MAX_TOTAL_ACTORS: u64 = 1_000_000;

/// One request to simulate audience behavior across rooms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSpec {
    /// Human-readable target label; defaults to `batch-<task id>`
    pub label: Option<String>,

    pub room_count: u32,
    pub actors_per_room: u32,

    /// Length of the message/recharge window; 0 runs enter/leave only
    pub duration_secs: u64,

    pub profile: BehaviorProfile,

    /// Join deadline per room unit; defaults to duration + engine grace
    pub join_timeout_secs: Option<u64>,

    /// Seed for reproducible behavior draws
    pub seed: Option<u64>,
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self {
            label: None,
            room_count: 1,
            actors_per_room: 10,
            duration_secs: 60,
            profile: BehaviorProfile::default(),
            join_timeout_secs: None,
            seed: None,
        }
    }
}

impl BatchSpec {
    /// Rejects malformed specs; called before any provisioning.
    pub fn validate(&self) -> Result<()> {
        if self.room_count == 0 {
            return Err(EngineError::validation("room_count", "must be greater than 0"));
        }
        if self.actors_per_room == 0 {
            return Err(EngineError::validation("actors_per_room", "must be greater than 0"));
        }
        if self.total_actors() > MAX_TOTAL_ACTORS {
            return Err(EngineError::validation(
                "actors_per_room",
                format!(
                    "{} total actors exceeds the limit of {}",
                    self.total_actors(),
                    MAX_TOTAL_ACTORS
                ),
            ));
        }
        if self.join_timeout_secs == Some(0) {
            return Err(EngineError::validation("join_timeout_secs", "must be greater than 0"));
        }
        if let Some(label) = &self.label {
            if label.trim().is_empty() {
                return Err(EngineError::validation("label", "cannot be blank"));
            }
        }
        self.profile.validate()
    }

    pub fn total_actors(&self) -> u64 {
        u64::from(self.room_count) * u64::from(self.actors_per_room)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Effective join timeout given the engine's grace margin.
    pub fn join_timeout(&self, grace: Duration) -> Duration {
        match self.join_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.duration() + grace,
        }
    }
}
