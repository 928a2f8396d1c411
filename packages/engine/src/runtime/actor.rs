// packages/engine/src/runtime/actor.rs
//! Behavior loop for one simulated audience member
//!
//! Runs enter → message/recharge loop → leave for a single bot. The loop
//! cooperates with two cancellation sources:
//!
//! - the task's `CancellationToken` (explicit `stop`)
//! - the shared deadline derived from the batch duration
//!
//! Every delay is raced against both, so an actor notices a stop at the
//! latest when its current gateway call returns. Action failures are logged
//! and counted as non-events; `run` never returns an error.

use crate::gateway::{ExternalGateway, RechargeReceipt};
use crate::runtime::behavior::{roll_percent, BehaviorProfile, JitterRange, MESSAGE_PROBABILITY_PERCENT};
use crate::runtime::stats::BehaviorStats;
use crate::state::idempotency::IdempotencyGuard;
use crate::state::task_registry::{TaskId, TaskRegistry};
use crate::utils::clock::Clock;
use crate::utils::errors::{EngineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const CANNED_MESSAGES: &[&str] = &[
    "hello everyone",
    "great stream!",
    "666",
    "what song is this?",
    "first time here",
    "love this room",
    "gg",
    "sending support",
];

/// Identity and behavior of one simulated bot
#[derive(Debug, Clone)]
pub struct ActorHandle {
    pub actor_id: String,
    pub room_id: String,

    /// Position of the actor within its batch, used for seeding
    pub index: u64,

    pub profile: Arc<BehaviorProfile>,
}

/// Everything the actors of one task share
pub struct SimulationContext {
    pub task_id: TaskId,
    pub deadline: Instant,
    pub cancel: CancellationToken,
    pub gateway: Arc<dyn ExternalGateway>,
    pub guard: Arc<IdempotencyGuard>,
    pub registry: Arc<TaskRegistry>,
    pub clock: Arc<dyn Clock>,

    /// TTL for recharge trace keys
    pub idempotency_ttl: Duration,

    /// Base seed for reproducible runs
    pub seed: Option<u64>,

    /// Total actors of the task, for progress reporting
    pub total_actors: u64,
}

impl SimulationContext {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.clock.now() < self.deadline
    }
}

/// Outcome of a cancellable delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Cancelled,
    DeadlineReached,
}

/// Runs one actor's behavior loop
pub struct ActorSimulator {
    handle: ActorHandle,
    ctx: Arc<SimulationContext>,
    rng: StdRng,
    stats: BehaviorStats,
    recharge_seq: u64,
}

impl ActorSimulator {
    pub fn new(handle: ActorHandle, ctx: Arc<SimulationContext>) -> Self {
        let rng = match ctx.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ handle.index.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        };

        Self {
            handle,
            ctx,
            rng,
            stats: BehaviorStats::default(),
            recharge_seq: 0,
        }
    }

    /// Runs the full loop and reports the result to the task registry.
    pub async fn run(mut self) -> BehaviorStats {
        let started = self.simulate().await;
        if !started {
            trace!("Actor {} never started", self.handle.actor_id);
        }

        let stats = self.stats;
        self.report(&stats);
        stats
    }

    /// Returns false when the actor was stopped before entering.
    async fn simulate(&mut self) -> bool {
        let profile = Arc::clone(&self.handle.profile);

        if self.ctx.cancel.is_cancelled() {
            return false;
        }

        if profile.toggles.enter {
            if self.sleep_cancellable(profile.enter_jitter).await == Wake::Cancelled {
                return false;
            }
            self.enter().await;
        }

        while self.ctx.is_active() {
            let mut acted = false;

            if profile.toggles.message && roll_percent(&mut self.rng, MESSAGE_PROBABILITY_PERCENT) {
                acted = true;
                if self.sleep_in_window(profile.message_jitter).await != Wake::Elapsed {
                    break;
                }
                self.send_message().await;
            }

            if !self.ctx.is_active() {
                break;
            }

            if profile.toggles.recharge && roll_percent(&mut self.rng, profile.recharge_probability) {
                acted = true;
                if self.sleep_in_window(profile.recharge_jitter).await != Wake::Elapsed {
                    break;
                }
                let amount = profile.recharge_amount.sample(&mut self.rng);
                self.recharge(amount).await;
            }

            // Idle viewer; wait a message interval before rolling again
            if !acted && self.sleep_in_window(profile.message_jitter).await != Wake::Elapsed {
                break;
            }
        }

        if profile.toggles.leave {
            if !self.ctx.cancel.is_cancelled() {
                // A stop during this delay means leave right away
                self.sleep_cancellable(profile.leave_jitter).await;
            }
            self.leave().await;
        }

        true
    }

    /// Recharge through the idempotency guard.
    ///
    /// Returns `Ok(None)` when the trace id was already used; the gateway is
    /// not called in that case.
    pub async fn guarded_recharge(&self, trace_id: &str, amount: u64) -> Result<Option<RechargeReceipt>> {
        if !self.ctx.guard.try_acquire(trace_id, self.ctx.idempotency_ttl) {
            debug!("Recharge {} already performed, skipping", trace_id);
            return Ok(None);
        }

        self.ctx
            .gateway
            .recharge(&self.handle.actor_id, &self.handle.room_id, amount, trace_id)
            .await
            .map(Some)
            .map_err(|e| EngineError::action("recharge", self.handle.actor_id.clone(), e))
    }

    async fn enter(&mut self) {
        let result = self.ctx.gateway.enter(&self.handle.room_id, &self.handle.actor_id).await;
        if self.observe("enter", result.map_err(EngineError::from)) {
            self.stats.enters += 1;
        }
    }

    async fn leave(&mut self) {
        let result = self.ctx.gateway.leave(&self.handle.room_id, &self.handle.actor_id).await;
        if self.observe("leave", result.map_err(EngineError::from)) {
            self.stats.leaves += 1;
        }
    }

    async fn send_message(&mut self) {
        let text = CANNED_MESSAGES.choose(&mut self.rng).copied().unwrap_or("hi");
        let result = self
            .ctx
            .gateway
            .send_message(&self.handle.room_id, &self.handle.actor_id, text)
            .await;
        if self.observe("message", result.map_err(EngineError::from)) {
            self.stats.messages += 1;
        }
    }

    async fn recharge(&mut self, amount: u64) {
        self.recharge_seq += 1;
        let trace_id = format!("{}:{}:{}", self.ctx.task_id, self.handle.actor_id, self.recharge_seq);

        match self.guarded_recharge(&trace_id, amount).await {
            Ok(Some(receipt)) if !receipt.duplicate => {
                metrics::counter!("sim_actions_total", "action" => "recharge", "outcome" => "ok").increment(1);
                self.stats.record_recharge(receipt.amount);
            }
            Ok(_) => {
                metrics::counter!("sim_actions_total", "action" => "recharge", "outcome" => "duplicate").increment(1);
            }
            Err(e) => {
                self.observe("recharge", Err::<(), _>(e));
            }
        }
    }

    /// Logs and meters an action outcome; true on success.
    fn observe<T>(&self, action: &'static str, result: Result<T>) -> bool {
        match result {
            Ok(_) => {
                metrics::counter!("sim_actions_total", "action" => action, "outcome" => "ok").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("sim_actions_total", "action" => action, "outcome" => "error").increment(1);
                let e = match e {
                    EngineError::Gateway(inner) => {
                        EngineError::action(action, self.handle.actor_id.clone(), inner)
                    }
                    other => other,
                };
                warn!("{}", e);
                false
            }
        }
    }

    /// Jittered delay that only a stop can interrupt.
    async fn sleep_cancellable(&mut self, jitter: JitterRange) -> Wake {
        let delay = jitter.sample(&mut self.rng);
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => Wake::Cancelled,
            _ = self.ctx.clock.sleep(delay) => Wake::Elapsed,
        }
    }

    /// Jittered delay cut short by a stop or by the deadline.
    async fn sleep_in_window(&mut self, jitter: JitterRange) -> Wake {
        let delay = jitter.sample(&mut self.rng);
        let remaining = self.ctx.clock.remaining(self.ctx.deadline);

        if remaining.is_zero() {
            return Wake::DeadlineReached;
        }

        let truncated = delay > remaining;
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => Wake::Cancelled,
            _ = self.ctx.clock.sleep(delay.min(remaining)) => {
                if truncated {
                    Wake::DeadlineReached
                } else {
                    Wake::Elapsed
                }
            }
        }
    }

    fn report(&self, stats: &BehaviorStats) {
        match self.ctx.registry.record_actor_stats(&self.ctx.task_id, stats) {
            Ok(finished) => {
                if self.ctx.total_actors > 0 {
                    let percent = (finished.min(self.ctx.total_actors) * 99 / self.ctx.total_actors) as u8;
                    if let Err(e) = self.ctx.registry.update_progress(&self.ctx.task_id, percent) {
                        trace!("{}", e);
                    }
                }
            }
            Err(e) => debug!("Could not report actor {}: {}", self.handle.actor_id, e),
        }
    }
}
