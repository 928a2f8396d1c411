// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate, later layers winning:
//!
//! 1. serde defaults
//! 2. TOML file (`$LIVEROOM_SIM_CONFIG`, else `liveroom-sim.toml` if present)
//! 3. environment, e.g. `LIVEROOM_SIM_RUNTIME__POOL_SIZE=64`
//!
//! Values are validated after loading; nothing is silently clamped.

use crate::executor::batch::BatchSpec;
use crate::gateway::SimulatedGatewayConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "LIVEROOM_SIM";

/// Environment variable naming the config file
pub const CONFIG_PATH_VAR: &str = "LIVEROOM_SIM_CONFIG";

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "liveroom-sim.toml";

/// Worker pool and join behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum concurrently running actor loops
    pub pool_size: usize,

    /// Seconds added to the batch duration for the join deadline
    pub join_grace_secs: u64,

    /// Interval of the time-based progress estimate
    pub progress_interval_ms: u64,

    /// How often the CLI polls task status
    pub status_poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_size: 256,
            join_grace_secs: 30,
            progress_interval_ms: 1_000,
            status_poll_interval_ms: 2_000,
        }
    }
}

/// Trace-key retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose a Prometheus scrape endpoint
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9464".to_string(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub idempotency: IdempotencyConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,

    /// Simulated downstream services used by the CLI
    pub gateway: SimulatedGatewayConfig,

    /// Batch the CLI submits
    pub batch: BatchSpec,
}

impl EngineConfig {
    /// Loads from the default locations plus environment overrides.
    pub fn load() -> Result<Self> {
        let (path, required) = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let config: Self = Config::builder()
            .add_source(File::from(path.as_path()).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Loads a single file without environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.pool_size == 0 {
            return Err(EngineError::ConfigError("runtime.pool_size must be > 0".into()));
        }
        if self.runtime.progress_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "runtime.progress_interval_ms must be > 0".into(),
            ));
        }
        if self.runtime.status_poll_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "runtime.status_poll_interval_ms must be > 0".into(),
            ));
        }
        if self.idempotency.ttl_secs == 0 {
            return Err(EngineError::ConfigError("idempotency.ttl_secs must be > 0".into()));
        }
        if self.idempotency.sweep_interval_secs == 0 {
            return Err(EngineError::ConfigError(
                "idempotency.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.metrics.enabled {
            self.metrics_addr()?;
        }
        self.gateway
            .validate()
            .map_err(|e| EngineError::ConfigError(format!("gateway: {}", e)))?;
        self.batch.validate()
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        self.metrics.listen.parse().map_err(|e| {
            EngineError::ConfigError(format!(
                "metrics.listen {:?} is not a socket address: {}",
                self.metrics.listen, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[runtime]
pool_size = 32

[batch]
room_count = 3
actors_per_room = 10
duration_secs = 0

[batch.profile]
recharge_probability = 0

[batch.profile.toggles]
message = false
"#,
        );

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.runtime.pool_size, 32);
        assert_eq!(config.runtime.join_grace_secs, 30);
        assert_eq!(config.batch.room_count, 3);
        assert_eq!(config.batch.profile.recharge_probability, 0);
        assert!(!config.batch.profile.toggles.message);
        assert!(config.batch.profile.toggles.enter);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let file = write_config(
            r#"
[batch.profile]
recharge_probability = 150
"#,
        );
        assert!(EngineConfig::from_file(file.path()).is_err());

        let file = write_config(
            r#"
[runtime]
pool_size = 0
"#,
        );
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_metrics_address() {
        let config = EngineConfig {
            metrics: MetricsConfig {
                enabled: true,
                listen: "not-an-address".into(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(EngineConfig::from_file("/nonexistent/liveroom-sim.toml").is_err());
    }
}
