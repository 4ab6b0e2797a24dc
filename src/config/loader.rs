//! Configuration Loader
//!
//! Environment-aware layering: compiled defaults, then `provisioner.toml`, then
//! `provisioner.{environment}.toml`, then `PROVISIONER__SECTION__KEY` variables.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::error::ConfigResult;
use super::EngineConfig;
use crate::constants::system::ENV_PREFIX;

const BASE_FILE: &str = "provisioner.toml";

pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));
        let config = Self::load_layered(&config_directory, environment, None)?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Build and validate the layered configuration.
    ///
    /// `env_overrides` replaces the process environment as the variable source when given.
    pub fn load_layered(
        config_directory: &Path,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<EngineConfig> {
        debug!(
            environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let defaults = EngineConfig {
            environment: environment.to_string(),
            ..EngineConfig::default()
        };

        let config: EngineConfig = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(
                config::File::from(config_directory.join(BASE_FILE))
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::File::from(config_directory.join(format!("provisioner.{environment}.toml")))
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env_overrides),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            environment = %config.environment,
            sweep_interval_ms = config.scheduler.sweep_interval_ms,
            concurrency = config.worker.concurrency,
            database_configured = config.database.url.is_some(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// `PROVISIONER_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var(format!("{ENV_PREFIX}_ENV"))
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
