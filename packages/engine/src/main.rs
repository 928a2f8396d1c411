// packages/engine/src/main.rs
//! Liveroom Simulation Engine
//!
//! Runs the configured batch of simulated audience members against the
//! in-process gateway, reporting progress until the task is terminal.
//! Ctrl+C requests a cooperative stop.

use anyhow::{bail, Result};
use liveroom_sim_engine::observability::{init_metrics, init_tracing};
use liveroom_sim_engine::{
    EngineConfig, OrchestratorConfig, SimulatedGateway, SimulationOrchestrator, TaskStatus, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first; it decides how logging is set up
    let config = EngineConfig::load()?;

    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting Liveroom Simulation Engine v{}", VERSION);
    info!("Configuration loaded: {:?}", config);

    let gateway = Arc::new(SimulatedGateway::new(config.gateway.clone()));
    let orchestrator = Arc::new(SimulationOrchestrator::new(
        OrchestratorConfig::from(&config),
        gateway.clone(),
    )?);

    let shutdown = CancellationToken::new();
    let sweeper = orchestrator.guard().spawn_sweeper(
        Duration::from_secs(config.idempotency.sweep_interval_secs),
        shutdown.clone(),
    );

    let handle = orchestrator.submit(config.batch.clone())?;
    let task_id = handle.task_id.clone();
    info!("Task {} submitted", task_id);

    let mut poll = tokio::time::interval(Duration::from_millis(config.runtime.status_poll_interval_ms));
    let wait = handle.wait();
    tokio::pin!(wait);

    let snapshot = loop {
        tokio::select! {
            finished = &mut wait => break finished?,

            _ = poll.tick() => {
                let status = orchestrator.get_status(&task_id)?;
                let pool = orchestrator.pool_stats();
                info!(
                    "Task {} {:?} {}% | actors {}/{} | enters={} messages={} recharges={} amount={} | failed rooms={} actors={} | pool {}/{}",
                    task_id,
                    status.status,
                    status.progress,
                    status.actors_finished,
                    status.requested_actors(),
                    status.counts.enters,
                    status.counts.messages,
                    status.counts.recharges,
                    status.counts.recharge_amount,
                    status.rooms_failed,
                    status.actors_failed,
                    pool.active,
                    pool.size,
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping task {}...", task_id);
                if let Err(e) = orchestrator.stop(&task_id) {
                    warn!("Stop failed: {}", e);
                }
            }
        }
    };

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Idempotency sweeper ended abnormally: {}", e);
    }

    info!("Gateway calls: {:?}", gateway.stats());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if snapshot.status == TaskStatus::Failed {
        bail!(
            "task {} failed: {}",
            snapshot.id,
            snapshot.last_error.unwrap_or_default()
        );
    }
    Ok(())
}
