// packages/engine/src/gateway/simulated.rs
//! In-process gateway used by the CLI and the test suite
//!
//! Stands in for the room, chat and payment services with configurable
//! latency and failure injection. It keeps a server-side recharge ledger
//! keyed by trace id, mirroring the dedup the real payment service does.

use super::{
    ExternalGateway, GatewayError, ProvisionFailure, ProvisionOutcome, ProvisionRequest,
    ProvisionedRoom, RechargeReceipt,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Knobs for the simulated downstream services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedGatewayConfig {
    /// Minimum per-call latency in milliseconds
    pub latency_min_ms: u64,

    /// Maximum per-call latency in milliseconds
    pub latency_max_ms: u64,

    /// Percent (0-100) of enter/leave/message/recharge calls that fail
    pub failure_percent: u8,

    /// Room indices whose provisioning fails
    pub failing_rooms: Vec<u32>,

    /// Room indices where `enter` hangs for `stall_ms`
    pub stalled_rooms: Vec<u32>,

    /// How long a stalled `enter` hangs
    pub stall_ms: u64,

    /// Fail every provisioning call outright
    pub unavailable: bool,
}

impl Default for SimulatedGatewayConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: 0,
            latency_max_ms: 0,
            failure_percent: 0,
            failing_rooms: vec![],
            stalled_rooms: vec![],
            stall_ms: 60_000,
            unavailable: false,
        }
    }
}

impl SimulatedGatewayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.latency_min_ms > self.latency_max_ms {
            return Err("latency_min_ms cannot exceed latency_max_ms".to_string());
        }
        if self.failure_percent > 100 {
            return Err("failure_percent cannot exceed 100".to_string());
        }
        Ok(())
    }
}

/// Call counters exposed for assertions and logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayCallStats {
    pub provisions: u64,
    pub enters: u64,
    pub leaves: u64,
    pub messages: u64,
    pub recharges: u64,
    pub failures: u64,
    pub peak_in_flight: usize,
}

/// Simulated room/chat/payment backend
pub struct SimulatedGateway {
    config: SimulatedGatewayConfig,
    provisions: AtomicU64,
    enters: AtomicU64,
    leaves: AtomicU64,
    messages: AtomicU64,
    recharges: AtomicU64,
    failures: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    stalled_room_ids: Mutex<HashSet<String>>,
    ledger: Mutex<HashMap<String, RechargeReceipt>>,
}

/// Tracks one in-flight call for the concurrency high-water mark
struct InFlight<'a>(&'a SimulatedGateway);

impl<'a> InFlight<'a> {
    fn enter(gateway: &'a SimulatedGateway) -> Self {
        let now = gateway.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gateway.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(gateway)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedGateway {
    pub fn new(config: SimulatedGatewayConfig) -> Self {
        Self {
            config,
            provisions: AtomicU64::new(0),
            enters: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            recharges: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            stalled_room_ids: Mutex::new(HashSet::new()),
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> GatewayCallStats {
        GatewayCallStats {
            provisions: self.provisions.load(Ordering::Relaxed),
            enters: self.enters.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            recharges: self.recharges.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }

    /// Distinct trace ids the payment side has accepted
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    fn room_id(task_id: &str, index: u32) -> String {
        format!("{}-room-{}", task_id, index)
    }

    /// Simulated network round trip plus failure injection.
    async fn round_trip(&self, action: &'static str) -> Result<(), GatewayError> {
        let (latency, fail) = {
            let mut rng = rand::thread_rng();
            let latency = if self.config.latency_max_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(
                    rng.gen_range(self.config.latency_min_ms..=self.config.latency_max_ms),
                )
            };
            let fail = rng.gen_range(0u8..100) < self.config.failure_percent;
            (latency, fail)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if fail {
            self.failures.fetch_add(1, Ordering::Relaxed);
            trace!("Injected failure for {}", action);
            return Err(GatewayError::Unavailable(format!("injected {} failure", action)));
        }
        Ok(())
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimulatedGatewayConfig::default())
    }
}

#[async_trait]
impl ExternalGateway for SimulatedGateway {
    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome, GatewayError> {
        self.provisions.fetch_add(1, Ordering::Relaxed);

        if self.config.unavailable {
            warn!("Provisioning service unavailable for task {}", request.task_id);
            return Err(GatewayError::Unavailable("provisioning service down".into()));
        }

        let mut outcome = ProvisionOutcome::default();
        let mut stalled = self.stalled_room_ids.lock();

        for index in 0..request.room_count {
            let room_id = Self::room_id(&request.task_id, index);

            if self.config.failing_rooms.contains(&index) {
                outcome.failures.push(ProvisionFailure {
                    room_id,
                    reason: "room quota exceeded".to_string(),
                });
                continue;
            }

            if self.config.stalled_rooms.contains(&index) {
                stalled.insert(room_id.clone());
            }

            let actor_ids = (0..request.actors_per_room)
                .map(|n| format!("{}-bot-{}", room_id, n))
                .collect();
            outcome.rooms.push(ProvisionedRoom { room_id, actor_ids });
        }

        debug!(
            "Provisioned {} rooms ({} failed) for task {}",
            outcome.rooms.len(),
            outcome.failures.len(),
            request.task_id
        );
        Ok(outcome)
    }

    async fn enter(&self, room_id: &str, actor_id: &str) -> Result<(), GatewayError> {
        let _guard = InFlight::enter(self);

        let stalled = self.stalled_room_ids.lock().contains(room_id);
        if stalled {
            tokio::time::sleep(Duration::from_millis(self.config.stall_ms)).await;
        }

        self.round_trip("enter").await?;
        self.enters.fetch_add(1, Ordering::Relaxed);
        trace!("{} entered {}", actor_id, room_id);
        Ok(())
    }

    async fn leave(&self, room_id: &str, actor_id: &str) -> Result<(), GatewayError> {
        let _guard = InFlight::enter(self);
        self.round_trip("leave").await?;
        self.leaves.fetch_add(1, Ordering::Relaxed);
        trace!("{} left {}", actor_id, room_id);
        Ok(())
    }

    async fn send_message(&self, room_id: &str, actor_id: &str, text: &str) -> Result<(), GatewayError> {
        let _guard = InFlight::enter(self);
        self.round_trip("message").await?;
        self.messages.fetch_add(1, Ordering::Relaxed);
        trace!("{} said {:?} in {}", actor_id, text, room_id);
        Ok(())
    }

    async fn recharge(
        &self,
        actor_id: &str,
        room_id: &str,
        amount: u64,
        trace_id: &str,
    ) -> Result<RechargeReceipt, GatewayError> {
        let _guard = InFlight::enter(self);
        self.round_trip("recharge").await?;
        self.recharges.fetch_add(1, Ordering::Relaxed);

        let mut ledger = self.ledger.lock();
        if let Some(existing) = ledger.get(trace_id) {
            debug!("Duplicate recharge for trace {}", trace_id);
            return Ok(RechargeReceipt {
                duplicate: true,
                ..existing.clone()
            });
        }

        let receipt = RechargeReceipt {
            order_id: ulid::Ulid::new().to_string(),
            trace_id: trace_id.to_string(),
            amount,
            duplicate: false,
        };
        ledger.insert(trace_id.to_string(), receipt.clone());
        trace!("{} recharged {} in {}", actor_id, amount, room_id);
        Ok(receipt)
    }
}
