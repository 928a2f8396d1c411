// packages/engine/src/state/task_registry.rs
//! Concurrent store of simulation task state
//!
//! Every mutation is a single method that runs inside one `DashMap` entry
//! guard, so concurrent workers never interleave a read-then-write on the
//! same task. Readers clone a snapshot and never observe a half-applied
//! update.
//!
//! # State machine
//!
//! ```text
//! PENDING ──► RUNNING ──► COMPLETED
//!    │           ├──────► FAILED
//!    │           └──────► STOPPED
//!    └──────────────────► FAILED
//! ```

use crate::executor::batch::BatchSpec;
use crate::runtime::stats::{BatchResult, BehaviorStats};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Opaque task identifier
pub type TaskId = String;

/// Lifecycle status of a simulation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// True when `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (*self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

/// State of one batch simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationTask {
    pub id: TaskId,

    /// Batch label or room id the task targets
    pub target: String,

    pub room_count: u32,
    pub actors_per_room: u32,
    pub duration_secs: u64,

    pub status: TaskStatus,

    /// 0-100, non-decreasing while running
    pub progress: u8,

    /// Set once `stop` has been requested; cleared never
    pub stop_requested: bool,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    /// Live totals folded in as actors finish
    pub counts: BehaviorStats,
    pub actors_finished: u64,

    /// Rooms lost so far (provisioning, join timeout, crash)
    pub rooms_failed: u64,

    /// Actors that crashed or could not be scheduled
    pub actors_failed: u64,

    /// Final aggregate, present once terminal (except setup failures)
    pub result: Option<BatchResult>,
}

impl SimulationTask {
    pub fn requested_actors(&self) -> u64 {
        u64::from(self.room_count) * u64::from(self.actors_per_room)
    }
}

/// Point-in-time copy of a task
pub type TaskSnapshot = SimulationTask;

/// Registry of all tasks known to an orchestrator
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, SimulationTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Registers a new task in `PENDING` and returns its id.
    pub fn create(&self, spec: &BatchSpec) -> TaskId {
        let id = Ulid::new().to_string();
        let task = SimulationTask {
            id: id.clone(),
            target: spec.label.clone().unwrap_or_else(|| format!("batch-{}", id)),
            room_count: spec.room_count,
            actors_per_room: spec.actors_per_room,
            duration_secs: spec.duration_secs,
            status: TaskStatus::Pending,
            progress: 0,
            stop_requested: false,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            last_error: None,
            counts: BehaviorStats::default(),
            actors_finished: 0,
            rooms_failed: 0,
            actors_failed: 0,
            result: None,
        };

        self.tasks.insert(id.clone(), task);
        debug!("Created task {}", id);
        id
    }

    /// Moves a task along a legal edge; anything else leaves it untouched.
    pub fn transition(&self, task_id: &str, next: TaskStatus) -> Result<TaskSnapshot> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        Self::check_edge(task, next)?;
        task.status = next;

        match next {
            TaskStatus::Running => task.started_at = Some(Utc::now()),
            status if status.is_terminal() => task.ended_at = Some(Utc::now()),
            _ => {}
        }

        info!("Task {} is now {:?}", task_id, next);
        Ok(task.clone())
    }

    /// Atomically applies a terminal transition together with the final
    /// result and error.
    pub fn finish(
        &self,
        task_id: &str,
        terminal: TaskStatus,
        result: Option<BatchResult>,
        error: Option<String>,
    ) -> Result<TaskSnapshot> {
        if !terminal.is_terminal() {
            return Err(EngineError::RuntimeError(format!(
                "finish called with non-terminal status {:?}",
                terminal
            )));
        }

        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        Self::check_edge(task, terminal)?;

        task.status = terminal;
        task.ended_at = Some(Utc::now());
        if terminal == TaskStatus::Completed {
            task.progress = 100;
        }
        if let Some(result) = result {
            task.counts = result.totals;
            task.rooms_failed = result.rooms_failed;
            task.actors_failed = result.actors_failed;
            task.result = Some(result);
        }
        if error.is_some() {
            task.last_error = error;
        }

        info!("Task {} finished as {:?}", task_id, terminal);
        Ok(task.clone())
    }

    /// Raises progress; only while running and never backwards.
    pub fn update_progress(&self, task_id: &str, percent: u8) -> Result<u8> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        if task.status != TaskStatus::Running {
            return Err(EngineError::ProgressRejected {
                task_id: task_id.to_string(),
                reason: format!("task is {:?}", task.status),
            });
        }
        if percent > 100 {
            return Err(EngineError::ProgressRejected {
                task_id: task_id.to_string(),
                reason: format!("{} exceeds 100", percent),
            });
        }
        if percent < task.progress {
            return Err(EngineError::ProgressRejected {
                task_id: task_id.to_string(),
                reason: format!("{} is below current {}", percent, task.progress),
            });
        }

        task.progress = percent;
        Ok(percent)
    }

    /// Folds one finished actor's counters into the live totals.
    pub fn record_actor_stats(&self, task_id: &str, stats: &BehaviorStats) -> Result<u64> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        if task.status != TaskStatus::Running {
            warn!("Dropping actor stats for task {} in {:?}", task_id, task.status);
            return Err(EngineError::ProgressRejected {
                task_id: task_id.to_string(),
                reason: format!("task is {:?}", task.status),
            });
        }

        task.counts += *stats;
        task.actors_finished += 1;
        Ok(task.actors_finished)
    }

    /// Counts partial failures on a live task so status reads show them
    /// before the batch finishes. `reason` becomes the task's last error.
    pub fn record_failures(
        &self,
        task_id: &str,
        rooms: u64,
        actors: u64,
        reason: impl Into<String>,
    ) -> Result<TaskSnapshot> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        if task.status.is_terminal() {
            return Err(EngineError::ProgressRejected {
                task_id: task_id.to_string(),
                reason: format!("task is {:?}", task.status),
            });
        }

        task.rooms_failed += rooms;
        task.actors_failed += actors;
        task.last_error = Some(reason.into());
        Ok(task.clone())
    }

    /// Records a stop request on a non-terminal task.
    pub fn request_stop(&self, task_id: &str) -> Result<TaskSnapshot> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let task = entry.value_mut();

        if task.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Stopped,
            });
        }

        task.stop_requested = true;
        Ok(task.clone())
    }

    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.get(task_id).map(|entry| entry.value().clone())
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn check_edge(task: &SimulationTask, next: TaskStatus) -> Result<()> {
        if task.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                task_id: task.id.clone(),
                from: task.status,
                to: next,
            })
        }
    }
}
