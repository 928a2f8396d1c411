// packages/engine/src/executor/orchestrator.rs
//! Top-level simulation orchestrator
//!
//! `submit` validates a batch, registers a task and returns immediately. A
//! supervisor task then provisions rooms, fans out one unit of work per room
//! (each unit runs its actors through the shared worker pool), joins every
//! unit against a bounded deadline and records the terminal state.
//!
//! # Lifecycle
//!
//! ```text
//! submit ─► validate ─► PENDING ─► provision ─┬─► FAILED (setup error, timeout)
//!                                             ├─► RUNNING ─► STOPPED (stopped meanwhile)
//!                                             └─► RUNNING ─► fan out rooms
//!                                                               │
//!                           join (bounded) ◄────────────────────┘
//!                                │
//!                                ├─► STOPPED   (stop requested)
//!                                └─► COMPLETED (full or partial)
//! ```
//!
//! A room that fails to provision, crashes or misses the join deadline only
//! degrades its own contribution; it never fails the batch.

use crate::executor::batch::BatchSpec;
use crate::gateway::{ExternalGateway, GatewayError, ProvisionRequest, ProvisionedRoom};
use crate::runtime::actor::{ActorHandle, ActorSimulator, SimulationContext};
use crate::runtime::behavior::BehaviorProfile;
use crate::runtime::stats::{BatchResult, BehaviorStats, RoomOutcome, RoomReport};
use crate::runtime::worker_pool::{PoolStats, WorkerPool};
use crate::state::idempotency::IdempotencyGuard;
use crate::state::task_registry::{TaskId, TaskRegistry, TaskSnapshot, TaskStatus};
use crate::utils::clock::{Clock, TokioClock};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Concurrently running actor loops across all tasks
    pub pool_size: usize,

    /// Added to the batch duration to form the default join deadline
    pub join_grace: Duration,

    /// How often the time-based progress estimate is pushed
    pub progress_interval: Duration,

    /// TTL for recharge trace keys
    pub idempotency_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pool_size: 256,
            join_grace: Duration::from_secs(30),
            progress_interval: Duration::from_secs(1),
            idempotency_ttl: Duration::from_secs(86_400),
        }
    }
}

impl From<&EngineConfig> for OrchestratorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            pool_size: config.runtime.pool_size,
            join_grace: Duration::from_secs(config.runtime.join_grace_secs),
            progress_interval: Duration::from_millis(config.runtime.progress_interval_ms),
            idempotency_ttl: Duration::from_secs(config.idempotency.ttl_secs),
        }
    }
}

/// Handle returned by [`SimulationOrchestrator::submit`]
pub struct TaskHandle {
    pub task_id: TaskId,
    supervisor: JoinHandle<()>,
    registry: Arc<TaskRegistry>,
}

impl TaskHandle {
    /// Waits for the task to reach a terminal status.
    pub async fn wait(self) -> Result<TaskSnapshot> {
        self.supervisor
            .await
            .map_err(|e| EngineError::RuntimeError(format!("supervisor join failed: {}", e)))?;

        self.registry
            .get(&self.task_id)
            .ok_or_else(|| EngineError::TaskNotFound(self.task_id.clone()))
    }
}

/// Entry point for submitting, stopping and polling simulation batches
pub struct SimulationOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<TaskRegistry>,
    guard: Arc<IdempotencyGuard>,
    gateway: Arc<dyn ExternalGateway>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,

    /// Stop signals of tasks that have not finished yet
    cancellations: DashMap<TaskId, CancellationToken>,
}

impl SimulationOrchestrator {
    pub fn new(config: OrchestratorConfig, gateway: Arc<dyn ExternalGateway>) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(config.pool_size)?);
        let guard = Arc::new(IdempotencyGuard::new(config.idempotency_ttl));

        Ok(Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            guard,
            gateway,
            pool,
            clock: Arc::new(TokioClock),
            cancellations: DashMap::new(),
        })
    }

    /// Replace the time source. The idempotency guard is rebuilt on the
    /// same clock, so call this before submitting anything.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.guard = Arc::new(IdempotencyGuard::with_clock(
            self.config.idempotency_ttl,
            Arc::clone(&clock),
        ));
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<IdempotencyGuard> {
        &self.guard
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Validates `spec`, registers a task and starts it in the background.
    pub fn submit(self: &Arc<Self>, spec: BatchSpec) -> Result<TaskHandle> {
        spec.validate()?;

        let task_id = self.registry.create(&spec);
        let cancel = CancellationToken::new();
        self.cancellations.insert(task_id.clone(), cancel.clone());

        info!(
            "Submitted task {}: {} rooms x {} actors for {}s (stop latency <= {:?})",
            task_id,
            spec.room_count,
            spec.actors_per_room,
            spec.duration_secs,
            spec.profile.min_interval()
        );

        let orchestrator = Arc::clone(self);
        let id = task_id.clone();
        let supervisor = tokio::spawn(async move {
            let inner = tokio::spawn({
                let orchestrator = Arc::clone(&orchestrator);
                let id = id.clone();
                async move { orchestrator.supervise(id, spec, cancel).await }
            });

            // A batch must always reach a terminal status
            if let Err(e) = inner.await {
                error!("Supervisor for task {} crashed: {}", id, e);
                orchestrator.fail(&id, None, format!("supervisor crashed: {}", e));
            }
            orchestrator.cancellations.remove(&id);
        });

        Ok(TaskHandle {
            task_id,
            supervisor,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Signals every actor of the task to wind down. Does not wait.
    pub fn stop(&self, task_id: &str) -> Result<()> {
        self.registry.request_stop(task_id)?;

        if let Some(token) = self.cancellations.get(task_id) {
            token.cancel();
        }
        info!("Stop requested for task {}", task_id);
        Ok(())
    }

    pub fn get_status(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.registry
            .get(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.registry.list_by_status(status)
    }

    /// Stops every live task and refuses further pool submissions.
    pub fn shutdown(&self) {
        for entry in self.cancellations.iter() {
            // A task may turn terminal between the iteration and this call
            if let Err(e) = self.registry.request_stop(entry.key()) {
                debug!("Not stopping task {}: {}", entry.key(), e);
            }
            entry.value().cancel();
        }
        self.pool.close();
        info!("Orchestrator shut down");
    }

    async fn supervise(self: Arc<Self>, task_id: TaskId, spec: BatchSpec, cancel: CancellationToken) {
        let request = ProvisionRequest {
            task_id: task_id.clone(),
            room_count: spec.room_count,
            actors_per_room: spec.actors_per_room,
        };

        // Provisioning shares the join budget and still honors stop
        let provision_timeout = spec.join_timeout(self.config.join_grace);
        let provisioned = tokio::select! {
            outcome = self.gateway.provision(&request) => outcome,
            _ = cancel.cancelled() => {
                info!("Task {} stopped during provisioning", task_id);
                self.stop_before_start(&task_id, &spec);
                return;
            }
            _ = self.clock.sleep(provision_timeout) => {
                warn!("Provisioning for task {} exceeded {:?}", task_id, provision_timeout);
                Err(GatewayError::Timeout)
            }
        };

        let outcome = match provisioned {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Provisioning failed for task {}: {}", task_id, e);
                self.fail(&task_id, None, EngineError::from(e).to_string());
                return;
            }
        };

        let mut reports: Vec<RoomReport> = outcome
            .failures
            .iter()
            .map(|failure| {
                let err = EngineError::Provisioning {
                    room: failure.room_id.clone(),
                    reason: failure.reason.clone(),
                };
                warn!("{}", err);
                RoomReport::failed(
                    failure.room_id.clone(),
                    RoomOutcome::ProvisioningFailed(failure.reason.clone()),
                )
            })
            .collect();

        if let Some(last) = outcome.failures.last() {
            self.note_failures(
                &task_id,
                outcome.failures.len() as u64,
                0,
                format!(
                    "{} room(s) failed to provision, last {}: {}",
                    outcome.failures.len(),
                    last.room_id,
                    last.reason
                ),
            );
        }

        if outcome.rooms.is_empty() {
            let result = BatchResult::from_reports(u64::from(spec.room_count), reports);
            self.fail(&task_id, Some(result), "no rooms could be provisioned".to_string());
            return;
        }

        if let Err(e) = self.registry.transition(&task_id, TaskStatus::Running) {
            error!("Task {} could not start: {}", task_id, e);
            self.fail(&task_id, None, format!("could not start: {}", e));
            return;
        }

        match self.run_rooms(&task_id, &spec, outcome.rooms, cancel.clone()).await {
            Ok(room_reports) => {
                reports.extend(room_reports);
                let result = BatchResult::from_reports(u64::from(spec.room_count), reports);
                let terminal = if cancel.is_cancelled() {
                    TaskStatus::Stopped
                } else {
                    TaskStatus::Completed
                };

                info!(
                    "Task {} done: {}/{} rooms completed, {} enters, {} messages, {} recharges ({})",
                    task_id,
                    result.rooms_completed,
                    result.rooms_requested,
                    result.totals.enters,
                    result.totals.messages,
                    result.totals.recharges,
                    result.totals.recharge_amount
                );

                if let Err(e) = self.registry.finish(&task_id, terminal, Some(result), None) {
                    error!("Could not finish task {}: {}", task_id, e);
                }
            }
            Err(e) => {
                error!("Task {} failed while running: {}", task_id, e);
                let result = BatchResult::from_reports(u64::from(spec.room_count), reports);
                self.fail(&task_id, Some(result), e.to_string());
            }
        }
    }

    /// Fans out one unit per room and joins them against the deadline.
    async fn run_rooms(
        &self,
        task_id: &str,
        spec: &BatchSpec,
        rooms: Vec<ProvisionedRoom>,
        cancel: CancellationToken,
    ) -> Result<Vec<RoomReport>> {
        if self.pool.is_closed() {
            return Err(EngineError::PoolClosed);
        }

        let start = self.clock.now();
        let deadline = start + spec.duration();
        let join_timeout = spec.join_timeout(self.config.join_grace);
        let join_deadline = start + join_timeout;

        let ctx = Arc::new(SimulationContext {
            task_id: task_id.to_string(),
            deadline,
            cancel: cancel.clone(),
            gateway: Arc::clone(&self.gateway),
            guard: Arc::clone(&self.guard),
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            idempotency_ttl: self.config.idempotency_ttl,
            seed: spec.seed,
            total_actors: rooms.iter().map(|room| room.actor_ids.len() as u64).sum(),
        });
        let profile = Arc::new(spec.profile.clone());

        let ticker = self.spawn_progress_ticker(task_id.to_string(), start, spec.duration());

        let mut units = Vec::with_capacity(rooms.len());
        let mut next_index = 0u64;
        for room in rooms {
            let first_index = next_index;
            next_index += room.actor_ids.len() as u64;

            let room_id = room.room_id.clone();
            let unit = tokio::spawn(run_room(
                Arc::clone(&self.pool),
                Arc::clone(&ctx),
                Arc::clone(&profile),
                room,
                first_index,
            ));
            units.push((room_id, unit));
        }
        debug!("Task {} dispatched {} room units", task_id, units.len());

        let mut reports = Vec::with_capacity(units.len());
        for (room_id, mut unit) in units {
            let remaining = self.clock.remaining(join_deadline);

            let report = tokio::select! {
                joined = &mut unit => match joined {
                    Ok(report) => report,
                    Err(e) => {
                        warn!("Room {} crashed: {}", room_id, e);
                        self.note_failures(task_id, 1, 0, format!("room {} crashed: {}", room_id, e));
                        RoomReport::failed(room_id, RoomOutcome::Crashed(e.to_string()))
                    }
                },
                _ = self.clock.sleep(remaining) => {
                    unit.abort();
                    let err = EngineError::JoinTimeout {
                        room: room_id.clone(),
                        timeout_ms: join_timeout.as_millis() as u64,
                    };
                    warn!("{}", err);
                    self.note_failures(task_id, 1, 0, err.to_string());
                    RoomReport::failed(room_id, RoomOutcome::TimedOut)
                }
            };
            reports.push(report);
        }

        ticker.abort();
        Ok(reports)
    }

    fn spawn_progress_ticker(&self, task_id: TaskId, start: Instant, duration: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let interval = self.config.progress_interval;

        tokio::spawn(async move {
            if duration.is_zero() {
                return;
            }
            loop {
                clock.sleep(interval).await;
                let elapsed = clock.now().saturating_duration_since(start);
                let percent = (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).min(99.0) as u8;

                // Rejections just mean an actor already pushed it higher
                match registry.update_progress(&task_id, percent) {
                    Ok(_) => {}
                    Err(EngineError::ProgressRejected { .. }) => {
                        if registry
                            .get(&task_id)
                            .map(|task| task.status.is_terminal())
                            .unwrap_or(true)
                        {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })
    }

    /// A stop that lands before any room is running still ends as STOPPED.
    fn stop_before_start(&self, task_id: &str, spec: &BatchSpec) {
        if let Err(e) = self.registry.transition(task_id, TaskStatus::Running) {
            error!("Task {} could not start: {}", task_id, e);
            self.fail(task_id, None, format!("could not start: {}", e));
            return;
        }

        let result = BatchResult::from_reports(u64::from(spec.room_count), Vec::new());
        if let Err(e) = self.registry.finish(
            task_id,
            TaskStatus::Stopped,
            Some(result),
            Some("stopped before start".to_string()),
        ) {
            error!("Could not mark task {} stopped: {}", task_id, e);
        }
    }

    fn note_failures(&self, task_id: &str, rooms: u64, actors: u64, reason: String) {
        if let Err(e) = self.registry.record_failures(task_id, rooms, actors, reason) {
            debug!("Could not record failures for task {}: {}", task_id, e);
        }
    }

    fn fail(&self, task_id: &str, result: Option<BatchResult>, error: String) {
        if let Err(e) = self.registry.finish(task_id, TaskStatus::Failed, result, Some(error)) {
            error!("Could not mark task {} failed: {}", task_id, e);
        }
    }
}

/// One room's unit of work: every actor goes through the pool and the room
/// folds their stats in completion order.
async fn run_room(
    pool: Arc<WorkerPool>,
    ctx: Arc<SimulationContext>,
    profile: Arc<BehaviorProfile>,
    room: ProvisionedRoom,
    first_index: u64,
) -> RoomReport {
    let mut actors = JoinSet::new();
    let mut actors_failed = 0u64;
    let room_size = room.actor_ids.len();

    for (offset, actor_id) in room.actor_ids.into_iter().enumerate() {
        let handle = ActorHandle {
            actor_id,
            room_id: room.room_id.clone(),
            index: first_index + offset as u64,
            profile: Arc::clone(&profile),
        };
        let simulator = ActorSimulator::new(handle, Arc::clone(&ctx));

        if let Err(e) = pool.submit_into(&mut actors, simulator.run()).await {
            warn!("Could not schedule actor in room {}: {}", room.room_id, e);

            // A closed pool refuses everyone left in the room too
            let lost = if e.is_fatal() { (room_size - offset) as u64 } else { 1 };
            actors_failed += lost;
            report_actor_failures(&ctx, lost, format!("room {}: {}", room.room_id, e));
            if e.is_fatal() {
                break;
            }
        }
    }

    let mut stats = BehaviorStats::default();
    let mut actors_completed = 0u64;
    while let Some(joined) = actors.join_next().await {
        match joined {
            Ok(actor_stats) => {
                stats += actor_stats;
                actors_completed += 1;
            }
            Err(e) => {
                warn!("Actor in room {} crashed: {}", room.room_id, e);
                actors_failed += 1;
                report_actor_failures(&ctx, 1, format!("actor in room {} crashed: {}", room.room_id, e));
            }
        }
    }

    debug!(
        "Room {} finished: {} actors completed, {} failed",
        room.room_id, actors_completed, actors_failed
    );

    RoomReport {
        room_id: room.room_id,
        outcome: RoomOutcome::Completed,
        actors_completed,
        actors_failed,
        stats,
    }
}

fn report_actor_failures(ctx: &SimulationContext, actors: u64, reason: String) {
    if let Err(e) = ctx.registry.record_failures(&ctx.task_id, 0, actors, reason) {
        debug!("Could not record actor failures for task {}: {}", ctx.task_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ProvisionOutcome, RechargeReceipt, SimulatedGateway, SimulatedGatewayConfig};
    use crate::runtime::behavior::{ActionToggles, JitterRange};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Gateway whose provisioning call never returns
    struct HungProvisioning;

    #[async_trait]
    impl ExternalGateway for HungProvisioning {
        async fn provision(&self, _request: &ProvisionRequest) -> std::result::Result<ProvisionOutcome, GatewayError> {
            std::future::pending().await
        }

        async fn enter(&self, _room_id: &str, _actor_id: &str) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        async fn leave(&self, _room_id: &str, _actor_id: &str) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        async fn send_message(&self, _room_id: &str, _actor_id: &str, _text: &str) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        async fn recharge(
            &self,
            _actor_id: &str,
            _room_id: &str,
            _amount: u64,
            _trace_id: &str,
        ) -> std::result::Result<RechargeReceipt, GatewayError> {
            Err(GatewayError::Unavailable("payments offline".into()))
        }
    }

    /// Tokio-backed clock that counts the delays routed through it
    #[derive(Default)]
    struct CountingClock {
        sleeps: AtomicU64,
    }

    #[async_trait]
    impl Clock for CountingClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(duration).await;
        }
    }

    fn orchestrator(gateway: SimulatedGateway, pool_size: usize) -> Arc<SimulationOrchestrator> {
        let config = OrchestratorConfig {
            pool_size,
            join_grace: Duration::from_secs(10),
            ..Default::default()
        };
        Arc::new(SimulationOrchestrator::new(config, Arc::new(gateway)).unwrap())
    }

    fn fast_spec(rooms: u32, actors: u32, duration_secs: u64) -> BatchSpec {
        let mut spec = BatchSpec {
            room_count: rooms,
            actors_per_room: actors,
            duration_secs,
            seed: Some(9),
            ..Default::default()
        };
        spec.profile.enter_jitter = JitterRange::new(10, 50);
        spec.profile.message_jitter = JitterRange::new(200, 400);
        spec.profile.recharge_jitter = JitterRange::new(200, 400);
        spec.profile.leave_jitter = JitterRange::new(10, 50);
        spec
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_spec_fails_synchronously() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 4);
        let spec = BatchSpec {
            room_count: 0,
            ..Default::default()
        };

        assert!(matches!(orchestrator.submit(spec), Err(EngineError::Validation { .. })));
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_leave_only_batch() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 8);
        let mut spec = fast_spec(3, 10, 0);
        spec.profile.toggles = ActionToggles {
            enter: true,
            message: false,
            recharge: false,
            leave: true,
        };

        let task = orchestrator.submit(spec).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);

        let result = task.result.unwrap();
        assert_eq!(result.totals.enters, 30);
        assert_eq!(result.totals.leaves, 30);
        assert_eq!(result.totals.messages, 0);
        assert_eq!(result.totals.recharges, 0);
        assert_eq!(result.rooms_completed, 3);
        assert_eq!(result.actors_completed, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_outage_fails_task() {
        let gateway = SimulatedGateway::new(SimulatedGatewayConfig {
            unavailable: true,
            ..Default::default()
        });
        let orchestrator = orchestrator(gateway, 4);

        let task = orchestrator.submit(fast_spec(2, 2, 1)).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.started_at.is_none());
        assert!(task.last_error.unwrap().contains("unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_provisioning_still_completes() {
        let gateway = SimulatedGateway::new(SimulatedGatewayConfig {
            failing_rooms: vec![1],
            ..Default::default()
        });
        let orchestrator = orchestrator(gateway, 4);

        let task = orchestrator.submit(fast_spec(3, 2, 2)).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let result = task.result.unwrap();
        assert_eq!(result.rooms_requested, 3);
        assert_eq!(result.rooms_provisioned, 2);
        assert_eq!(result.rooms_completed, 2);
        assert_eq!(result.rooms_failed, 1);
        assert_eq!(result.totals.enters, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_rooms_failing_provisioning() {
        let gateway = SimulatedGateway::new(SimulatedGatewayConfig {
            failing_rooms: vec![0, 1],
            ..Default::default()
        });
        let orchestrator = orchestrator(gateway, 4);

        let task = orchestrator.submit(fast_spec(2, 2, 2)).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.result.unwrap().rooms_failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_room_times_out_in_isolation() {
        let gateway = SimulatedGateway::new(SimulatedGatewayConfig {
            stalled_rooms: vec![0],
            stall_ms: 3_600_000,
            ..Default::default()
        });
        let orchestrator = orchestrator(gateway, 8);
        let mut spec = fast_spec(2, 2, 1);
        spec.join_timeout_secs = Some(5);

        let task = orchestrator.submit(spec).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let result = task.result.unwrap();
        assert_eq!(result.rooms_completed, 1);
        assert_eq!(result.rooms_failed, 1);
        assert!(result
            .room_reports
            .iter()
            .any(|report| report.outcome == RoomOutcome::TimedOut));

        // The aborted room released its pool slots
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(orchestrator.pool_stats().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_marks_task_stopped() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 8);
        let handle = orchestrator.submit(fast_spec(2, 3, 3_600)).unwrap();
        let task_id = handle.task_id.clone();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(orchestrator.get_status(&task_id).unwrap().status, TaskStatus::Running);

        orchestrator.stop(&task_id).unwrap();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(task.stop_requested);
        let result = task.result.unwrap();
        assert_eq!(result.totals.enters, 6);
        assert_eq!(result.totals.leaves, 6);

        // Terminal tasks reject further stops
        assert!(matches!(
            orchestrator.stop(&task_id),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provisioning_times_out() {
        let orchestrator = Arc::new(
            SimulationOrchestrator::new(OrchestratorConfig::default(), Arc::new(HungProvisioning)).unwrap(),
        );
        let mut spec = fast_spec(2, 2, 10);
        spec.join_timeout_secs = Some(5);

        let started = Instant::now();
        let task = orchestrator.submit(spec).unwrap().wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.started_at.is_none());
        assert!(task.last_error.unwrap().contains("timed out"));
        assert!(started.elapsed() <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_hung_provisioning() {
        let orchestrator = Arc::new(
            SimulationOrchestrator::new(OrchestratorConfig::default(), Arc::new(HungProvisioning)).unwrap(),
        );
        let handle = orchestrator.submit(fast_spec(2, 2, 3_600)).unwrap();
        let task_id = handle.task_id.clone();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.get_status(&task_id).unwrap().status, TaskStatus::Pending);

        let stopped_at = Instant::now();
        orchestrator.stop(&task_id).unwrap();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(stopped_at.elapsed() < Duration::from_millis(10));
        assert_eq!(task.result.unwrap().totals, BehaviorStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_visible_while_running() {
        let gateway = SimulatedGateway::new(SimulatedGatewayConfig {
            failing_rooms: vec![0, 1],
            ..Default::default()
        });
        let orchestrator = orchestrator(gateway, 4);
        let handle = orchestrator.submit(fast_spec(3, 2, 60)).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let live = orchestrator.get_status(&handle.task_id).unwrap();
        assert_eq!(live.status, TaskStatus::Running);
        assert_eq!(live.rooms_failed, 2);
        assert!(live.result.is_none());
        assert!(live.last_error.unwrap().contains("failed to provision"));

        let task = handle.wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.rooms_failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_clock_drives_delays() {
        let clock = Arc::new(CountingClock::default());
        let orchestrator = Arc::new(
            SimulationOrchestrator::new(OrchestratorConfig::default(), Arc::new(SimulatedGateway::default()))
                .unwrap()
                .with_clock(clock.clone()),
        );

        let task = orchestrator.submit(fast_spec(1, 2, 5)).unwrap().wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        // At least the enter and leave jitter of both actors
        assert!(clock.sleeps.load(Ordering::Relaxed) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_task() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 1);
        assert!(matches!(orchestrator.stop("nope"), Err(EngineError::TaskNotFound(_))));
        assert!(orchestrator.get_status("nope").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_advances_while_running() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 8);
        let handle = orchestrator.submit(fast_spec(1, 2, 100)).unwrap();
        let task_id = handle.task_id.clone();

        let mut last = 0;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(4)).await;
            let task = orchestrator.get_status(&task_id).unwrap();
            assert!(task.progress >= last);
            last = task.progress;
        }
        assert!(last > 50 && last < 100);

        let task = handle.wait().await.unwrap();
        assert_eq!(task.progress, 100);
        assert_eq!(orchestrator.list_by_status(TaskStatus::Completed), vec![task_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_running_tasks() {
        let orchestrator = orchestrator(SimulatedGateway::default(), 4);
        let handle = orchestrator.submit(fast_spec(1, 2, 3_600)).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        orchestrator.shutdown();

        let task = handle.wait().await.unwrap();
        assert_eq!(task.status, TaskStatus::Stopped);
    }
}
