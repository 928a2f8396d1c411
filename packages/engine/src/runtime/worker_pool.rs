// packages/engine/src/runtime/worker_pool.rs
//! Fixed-size worker pool for actor loops
//!
//! Instead of spawning one unbounded task per bot, every actor loop is
//! submitted through a small pool of permits. A submitter waits for a free
//! permit *before* its future is spawned, so thousands of requested bots
//! never turn into thousands of live loops.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool (size = N permits)
//! ├─ Active:  [loop1, loop2, ...]    (≤ N running futures)
//! └─ Waiters: [room1, room2, ...]    (submitters blocked on a permit)
//! ```
//!
//! # Backpressure
//!
//! - `submit` suspends until a permit is free
//! - the permit is held by the spawned task and released when it finishes,
//!   panics or is aborted

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

/// Configuration for the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum concurrently running actor loops (default: 256)
    pub size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { size: 256 }
    }
}

/// Counters shared between the pool and its running slots
#[derive(Default)]
struct PoolCounters {
    active: AtomicUsize,
    peak_active: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

/// One occupied slot; releases the permit and the active count on drop
struct Slot {
    counters: Arc<PoolCounters>,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    fn occupy(counters: Arc<PoolCounters>, permit: OwnedSemaphorePermit) -> Self {
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_active.fetch_max(active, Ordering::SeqCst);
        metrics::gauge!("sim_pool_active_workers").set(active as f64);
        Self {
            counters,
            _permit: permit,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let active = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("sim_pool_active_workers").set(active as f64);
    }
}

/// Bounded pool of concurrent actor loops
pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Create a pool with `size` slots
    pub fn new(size: usize) -> Result<Self> {
        Self::with_config(WorkerPoolConfig { size })
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: WorkerPoolConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(EngineError::ConfigError(
                "worker pool size must be greater than 0".to_string(),
            ));
        }

        info!("Initializing worker pool with {} slots", config.size);

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.size)),
            counters: Arc::new(PoolCounters::default()),
            config,
        })
    }

    /// Waits for a free slot, then spawns `future` on it.
    pub async fn submit<F, T>(&self, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.acquire_slot().await?;
        Ok(tokio::spawn(async move {
            let _slot = slot;
            future.await
        }))
    }

    /// Like [`WorkerPool::submit`] but spawns into a caller-owned `JoinSet`,
    /// so dropping the set aborts everything it holds.
    pub async fn submit_into<F, T>(&self, set: &mut JoinSet<T>, future: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.acquire_slot().await?;
        set.spawn(async move {
            let _slot = slot;
            future.await
        });
        Ok(())
    }

    async fn acquire_slot(&self) -> Result<Slot> {
        // Wait for available slot (backpressure mechanism)
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolClosed)?;

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Acquired pool slot ({} free)",
            self.semaphore.available_permits()
        );
        Ok(Slot::occupy(Arc::clone(&self.counters), permit))
    }

    /// Refuses further submissions; running futures are unaffected.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.config.size,
            active: self.counters.active.load(Ordering::SeqCst),
            peak_active: self.counters.peak_active.load(Ordering::SeqCst),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub active: usize,
    pub peak_active: usize,
    pub submitted: u64,
    pub completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_size_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[tokio::test]
    async fn test_submit_and_release() {
        let pool = WorkerPool::new(4).unwrap();

        let handle = pool.submit(async { 21 * 2 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 42);

        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_size() {
        let pool = Arc::new(WorkerPool::new(4).unwrap());
        let mut handles = vec![];

        // 10x more work than slots
        for i in 0..40u64 {
            let handle = pool
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    i
                })
                .await
                .unwrap();
            handles.push(handle);
            assert!(pool.stats().active <= 4);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.peak_active, 4);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 40);
    }

    #[tokio::test]
    async fn test_panicking_future_releases_slot() {
        let pool = WorkerPool::new(1).unwrap();

        let handle = pool
            .submit(async {
                panic!("actor blew up");
            })
            .await
            .unwrap();
        assert!(handle.await.is_err());

        // Slot is free again
        let handle = pool.submit(async { 1 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_join_set_frees_slots() {
        let pool = WorkerPool::new(2).unwrap();
        let mut set = JoinSet::new();

        for _ in 0..2 {
            pool.submit_into(&mut set, async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .await
            .unwrap();
        }
        assert_eq!(pool.stats().active, 2);

        drop(set);
        tokio::task::yield_now().await;

        let handle = pool.submit(async { "free" }).await.unwrap();
        assert_eq!(handle.await.unwrap(), "free");
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(1).unwrap();
        pool.close();
        assert!(matches!(
            pool.submit(async {}).await,
            Err(EngineError::PoolClosed)
        ));
    }
}
