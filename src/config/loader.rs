//! Configuration loader: environment detection plus file and
//! environment-variable layering.
//!
//! Lookup order, later sources winning: built-in defaults, then
//! `gradeflow.toml` in the given directory (optional), then `GRADEFLOW_*`
//! environment variables (`GRADEFLOW_DEFAULT_BATCH_SIZE=500` and friends).

use super::error::ConfigResult;
use super::EngineConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const ENV_VAR: &str = "GRADEFLOW_ENV";
const CONFIG_FILE_STEM: &str = "gradeflow";

/// Loaded configuration plus the environment it was resolved for
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection, no config file
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration, merging `gradeflow.toml` from the given directory
    /// when present
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment; used by tests so they do not
    /// mutate process-global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = Config::builder();

        if let Some(dir) = &config_dir {
            let base = dir.join(format!("{CONFIG_FILE_STEM}.toml"));
            let overlay = dir.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));
            builder = builder
                .add_source(File::from(base).required(false))
                .add_source(File::from(overlay).required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("GRADEFLOW").separator("__"))
            .build()?;
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!(
            environment,
            batch_size = config.default_batch_size,
            failure_threshold = config.max_consecutive_failures,
            "configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Resolve the running environment from `GRADEFLOW_ENV`
    pub fn detect_environment() -> String {
        env::var(ENV_VAR).unwrap_or_else(|_| "development".to_string())
    }
}
