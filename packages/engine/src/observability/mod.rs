// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! - **Tracing**: `tracing-subscriber` with an `EnvFilter` (`RUST_LOG` wins
//!   over the configured level), plain or JSON output
//! - **Metrics**: `metrics` facade exported through a Prometheus endpoint
//!
//! # Metrics
//!
//! - `sim_actions_total{action, outcome}`: gateway actions by result
//! - `sim_pool_active_workers`: currently occupied pool slots

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::ConfigError(format!("invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| EngineError::ConfigError(format!("tracing already initialized: {}", e)))
}

/// Installs the Prometheus exporter when enabled. Must run inside a tokio
/// runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("invalid metrics address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("failed to install metrics exporter: {}", e)))?;

    metrics::describe_counter!("sim_actions_total", "Simulated gateway actions by action and outcome");
    metrics::describe_gauge!("sim_pool_active_workers", "Occupied worker pool slots");

    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_is_noop() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }
}
