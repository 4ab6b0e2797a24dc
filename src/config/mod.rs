//! # Engine Configuration
//!
//! Typed configuration tree with compiled defaults. [`ConfigManager`] layers TOML files and
//! `PROVISIONER__SECTION__KEY` environment variables on top of [`EngineConfig::default`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provisioner_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().scheduler.sweep_interval();
//! let workers = manager.config().worker.concurrency;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system::DEFAULT_EXECUTOR_RELEASE_ATTEMPTS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub environment: String,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let non_zero = [
            ("database.max_connections", self.database.max_connections as u64),
            (
                "database.acquire_timeout_seconds",
                self.database.acquire_timeout_seconds,
            ),
            ("scheduler.sweep_interval_ms", self.scheduler.sweep_interval_ms),
            ("worker.concurrency", self.worker.concurrency as u64),
            ("worker.queue_capacity", self.worker.queue_capacity as u64),
            (
                "worker.executor_release_attempts",
                self.worker.executor_release_attempts as u64,
            ),
            ("events.channel_capacity", self.events.channel_capacity as u64),
        ];

        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than zero",
                ));
            }
        }

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ConfigurationError::invalid_value(
                    "database.url",
                    "[redacted]",
                    "must be a postgres:// or postgresql:// URL",
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Unset means the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period between scheduler sweeps
    pub sweep_interval_ms: u64,
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs executed concurrently by one worker
    pub concurrency: usize,
    /// Capacity of the in-process job queue
    pub queue_capacity: usize,
    /// Attempts to clear `executor_running` at the end of a tick
    pub executor_release_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            queue_capacity: 1024,
            executor_release_attempts: DEFAULT_EXECUTOR_RELEASE_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// JSON console output
    pub json: bool,
    /// Also write JSON logs to a file in this directory
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.worker.executor_release_attempts, 3);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = EngineConfig::default();
        config.worker.concurrency = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.concurrency"));
    }

    #[test]
    fn test_non_postgres_url_is_rejected() {
        let mut config = EngineConfig::default();
        config.database.url = Some("mysql://localhost/db".to_string());
        assert!(config.validate().is_err());

        config.database.url = Some("postgresql://localhost/provisioner".to_string());
        assert!(config.validate().is_ok());
    }
}
