// packages/engine/src/gateway/mod.rs
//! Downstream platform gateway
//!
//! The engine never talks to the room, chat or payment services directly.
//! Everything goes through [`ExternalGateway`], a narrow async interface
//! that collaborating services implement. [`SimulatedGateway`] is the
//! in-process implementation used by the binary and the test suite.
//!
//! # Architecture
//!
//! ```text
//! ActorSimulator ──┬─ enter / leave ─────────┐
//!                  ├─ send_message ──────────┤──► ExternalGateway
//!                  └─ IdempotencyGuard ─► recharge
//! Orchestrator ───── provision (batch) ──────┘
//! ```

pub mod simulated;

pub use simulated::{SimulatedGateway, SimulatedGatewayConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a gateway implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,
}

/// Batch provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Task the rooms are provisioned for
    pub task_id: String,
    pub room_count: u32,
    pub actors_per_room: u32,
}

/// One room and the bots assigned to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedRoom {
    pub room_id: String,
    pub actor_ids: Vec<String>,
}

/// A room that could not be provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionFailure {
    pub room_id: String,
    pub reason: String,
}

/// Outcome of a batch provisioning call; per-room failures are tolerated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub rooms: Vec<ProvisionedRoom>,
    pub failures: Vec<ProvisionFailure>,
}

/// Confirmation returned by a successful recharge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeReceipt {
    pub order_id: String,
    pub trace_id: String,
    pub amount: u64,
    /// True when the remote side had already seen this trace id
    pub duplicate: bool,
}

/// Client for the room, chat and payment services plus bot provisioning
#[async_trait]
pub trait ExternalGateway: Send + Sync + 'static {
    /// Creates or looks up rooms and bot identities for a batch.
    ///
    /// An `Err` fails the whole submission; per-room problems belong in
    /// [`ProvisionOutcome::failures`].
    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome, GatewayError>;

    async fn enter(&self, room_id: &str, actor_id: &str) -> Result<(), GatewayError>;

    async fn leave(&self, room_id: &str, actor_id: &str) -> Result<(), GatewayError>;

    async fn send_message(&self, room_id: &str, actor_id: &str, text: &str) -> Result<(), GatewayError>;

    /// Issues a payment. Implementations are expected to dedup on
    /// `trace_id` as well; the local guard is only the first line.
    async fn recharge(
        &self,
        actor_id: &str,
        room_id: &str,
        amount: u64,
        trace_id: &str,
    ) -> Result<RechargeReceipt, GatewayError>;
}
