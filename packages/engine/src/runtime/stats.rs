// packages/engine/src/runtime/stats.rs
//! Per-actor counters and batch aggregation
//!
//! `BehaviorStats` is folded with a plain field-wise sum, which is
//! associative and commutative, so rooms and actors may complete in any
//! order without changing the totals.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Counters produced by one actor run (or a sum of them)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorStats {
    pub enters: u64,
    pub leaves: u64,
    pub messages: u64,
    pub recharges: u64,
    pub recharge_amount: u64,
}

impl BehaviorStats {
    pub fn record_recharge(&mut self, amount: u64) {
        self.recharges += 1;
        self.recharge_amount = self.recharge_amount.saturating_add(amount);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for BehaviorStats {
    fn add_assign(&mut self, other: Self) {
        self.enters += other.enters;
        self.leaves += other.leaves;
        self.messages += other.messages;
        self.recharges += other.recharges;
        self.recharge_amount = self.recharge_amount.saturating_add(other.recharge_amount);
    }
}

impl Add for BehaviorStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl Sum for BehaviorStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a BehaviorStats> for BehaviorStats {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// How a room's unit of work ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RoomOutcome {
    Completed,
    ProvisioningFailed(String),
    TimedOut,
    Crashed(String),
}

/// Result of one room's unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomReport {
    pub room_id: String,
    pub outcome: RoomOutcome,
    pub actors_completed: u64,
    pub actors_failed: u64,
    pub stats: BehaviorStats,
}

impl RoomReport {
    pub fn failed(room_id: impl Into<String>, outcome: RoomOutcome) -> Self {
        Self {
            room_id: room_id.into(),
            outcome,
            actors_completed: 0,
            actors_failed: 0,
            stats: BehaviorStats::default(),
        }
    }
}

/// Aggregate result of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub totals: BehaviorStats,
    pub rooms_requested: u64,
    pub rooms_provisioned: u64,
    pub rooms_completed: u64,
    pub rooms_failed: u64,
    pub actors_completed: u64,
    pub actors_failed: u64,
    pub room_reports: Vec<RoomReport>,
}

impl BatchResult {
    /// Builds the batch result from room reports in whatever order they
    /// arrived.
    pub fn from_reports(rooms_requested: u64, reports: Vec<RoomReport>) -> Self {
        let mut result = Self {
            rooms_requested,
            ..Default::default()
        };

        for report in &reports {
            match report.outcome {
                RoomOutcome::Completed => {
                    result.rooms_provisioned += 1;
                    result.rooms_completed += 1;
                    result.totals += report.stats;
                }
                RoomOutcome::ProvisioningFailed(_) => {
                    result.rooms_failed += 1;
                }
                RoomOutcome::TimedOut | RoomOutcome::Crashed(_) => {
                    result.rooms_provisioned += 1;
                    result.rooms_failed += 1;
                }
            }
            result.actors_completed += report.actors_completed;
            result.actors_failed += report.actors_failed;
        }

        result.room_reports = reports;
        result
    }
}
