//! Engine configuration: explicit, validated defaults for every knob the
//! engine exposes, loadable from a file with environment-variable overrides.

pub mod error;
pub mod loader;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TaskConfig;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Engine-wide configuration.
///
/// Per-task settings in [`TaskConfig`] start from these values; callers can
/// override them task by task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default rows per batch for new tasks
    pub default_batch_size: usize,
    /// Default consecutive batch-failure threshold; 0 disables task-level
    /// failure. The engine ships with 5.
    pub max_consecutive_failures: u32,
    /// Default strict mode (abort the task on the first batch error)
    pub strict_mode: bool,
    /// Capacity of the notification broadcast channel
    pub event_channel_capacity: usize,
    /// Terminal tasks older than this many days are eligible for cleanup
    pub checkpoint_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 100,
            max_consecutive_failures: 5,
            strict_mode: false,
            event_channel_capacity: 1024,
            checkpoint_retention_days: 7,
        }
    }
}

impl EngineConfig {
    /// Per-task defaults derived from this engine configuration
    pub fn task_defaults(&self) -> TaskConfig {
        TaskConfig {
            batch_size: self.default_batch_size,
            strict_mode: self.strict_mode,
            max_consecutive_failures: self.max_consecutive_failures,
            ..TaskConfig::default()
        }
    }

    /// Cutoff timestamp for the configured retention window
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.checkpoint_retention_days)
    }

    /// Validate the loaded configuration before use
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_batch_size == 0 {
            return Err(ConfigurationError::Invalid(
                "default_batch_size must be at least 1".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::Invalid(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.checkpoint_retention_days < 0 {
            return Err(ConfigurationError::Invalid(
                "checkpoint_retention_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
