// packages/engine/src/state/idempotency.rs
//! At-most-once guard for side-effecting actions
//!
//! `try_acquire` is a single `DashMap::entry` call, so the check and the
//! insert happen under the same shard lock and two callers can never both
//! observe an absent key.
//!
//! Keys expire after their TTL. A replay after expiry is treated as a new,
//! distinct action; the guard is an in-process first line of defense and
//! the payment service still dedups on the trace id.
//!
//! Expiry is measured on the same [`Clock`] the actors use for their
//! deadlines.

use crate::utils::clock::{Clock, TokioClock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Shared trace-key space with per-key expiry
pub struct IdempotencyGuard {
    /// Trace key -> expiry instant
    keys: DashMap<String, Instant>,

    /// TTL applied by [`IdempotencyGuard::acquire`]
    default_ttl: Duration,

    clock: Arc<dyn Clock>,
}

impl IdempotencyGuard {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(TokioClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys: DashMap::new(),
            default_ttl,
            clock,
        }
    }

    /// Returns true exactly once per live `trace_key`.
    pub fn try_acquire(&self, trace_key: &str, ttl: Duration) -> bool {
        let now = self.clock.now();

        match self.keys.entry(trace_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() <= now {
                    trace!("Trace key {} expired, re-acquiring", trace_key);
                    occupied.insert(now + ttl);
                    true
                } else {
                    debug!("Trace key {} already performed", trace_key);
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + ttl);
                true
            }
        }
    }

    /// `try_acquire` with the guard's default TTL
    pub fn acquire(&self, trace_key: &str) -> bool {
        self.try_acquire(trace_key, self.default_ttl)
    }

    /// True if `trace_key` is held and not expired
    pub fn contains(&self, trace_key: &str) -> bool {
        self.keys
            .get(trace_key)
            .map(|expiry| *expiry > self.clock.now())
            .unwrap_or(false)
    }

    /// Drops expired keys, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.keys.len();
        self.keys.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.keys.len())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Periodically purges expired keys until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let guard = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Idempotency sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = guard.purge_expired();
                        if purged > 0 {
                            debug!("Purged {} expired trace keys", purged);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_once() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.acquire("trace-1"));
        assert!(!guard.acquire("trace-1"));
        assert!(!guard.acquire("trace-1"));
        assert!(guard.acquire("trace-2"));
        assert_eq!(guard.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_allows_reacquire() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.try_acquire("trace", Duration::from_secs(5)));
        assert!(guard.contains("trace"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!guard.contains("trace"));
        assert!(guard.try_acquire("trace", Duration::from_secs(5)));
        assert!(!guard.try_acquire("trace", Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let guard = IdempotencyGuard::new(Duration::from_secs(1));
        guard.acquire("a");
        guard.try_acquire("b", Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.contains("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops() {
        let guard = Arc::new(IdempotencyGuard::new(Duration::from_secs(1)));
        guard.acquire("short-lived");

        let shutdown = CancellationToken::new();
        let handle = guard.spawn_sweeper(Duration::from_secs(5), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(guard.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    /// Clock that only moves when told to
    struct ManualClock {
        now: parking_lot::Mutex<Instant>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *self.now.lock() += by;
        }
    }

    #[async_trait::async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    #[tokio::test]
    async fn test_expiry_follows_injected_clock() {
        let clock = Arc::new(ManualClock {
            now: parking_lot::Mutex::new(Instant::now()),
        });
        let guard = IdempotencyGuard::with_clock(Duration::from_secs(5), clock.clone());

        assert!(guard.acquire("trace"));
        assert!(!guard.acquire("trace"));

        // Only the injected clock decides expiry
        clock.advance(Duration::from_secs(6));
        assert!(!guard.contains("trace"));
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.acquire("trace"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_acquire_single_winner() {
        let guard = Arc::new(IdempotencyGuard::new(Duration::from_secs(60)));
        let mut handles = vec![];

        for _ in 0..64 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move { guard.acquire("same-key") }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
