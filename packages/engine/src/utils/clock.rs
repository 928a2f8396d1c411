// packages/engine/src/utils/clock.rs
//! Time source abstraction
//!
//! Every simulated delay and deadline check goes through a [`Clock`] so that
//! tests can run on a virtual clock. `TokioClock` is built on `tokio::time`,
//! which means `#[tokio::test(start_paused = true)]` gives deterministic,
//! instantly-advancing time without any extra plumbing.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Source of "now" and of suspension for simulated delays
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Time left until `deadline`, zero if it has passed.
    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// Production clock backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
